//! Error types for the personachat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and the top-level
//! [`Error`] maps every hard failure to a stable kind tag and an
//! HTTP-style status code so callers can surface it without matching on
//! internals.

use thiserror::Error;

/// The top-level error type for all personachat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Retrieval errors ---
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Budget ---
    #[error("Insufficient token budget: {required} tokens required, {remaining} remaining")]
    InsufficientBudget { required: u64, remaining: u64 },

    // --- Provider errors ---
    #[error("Model invocation failed: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Account service ---
    #[error("Account service error: {0}")]
    Account(#[from] AccountError),

    // --- Character data ---
    #[error("Character error: {0}")]
    Character(#[from] CharacterError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, machine-readable tag for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Retrieval(_) => "retrieval_failure",
            Error::InsufficientBudget { .. } => "insufficient_budget",
            Error::Provider(_) => "model_invocation_failure",
            Error::Memory(_) => "memory_failure",
            Error::Account(_) => "account_failure",
            Error::Character(_) => "invalid_character",
            Error::Config { .. } => "configuration_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP-style status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InsufficientBudget { .. } | Error::Character(_) => 400,
            Error::Provider(ProviderError::RateLimited { .. }) => 429,
            Error::Provider(ProviderError::Timeout(_)) => 504,
            Error::Provider(_) => 502,
            Error::Retrieval(_) | Error::Memory(_) | Error::Account(_) => 503,
            Error::Config { .. } | Error::Serialization(_) | Error::Internal(_) => 500,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("{mode} retriever failed for namespace '{namespace}': {reason}")]
    Backend {
        mode: String,
        namespace: String,
        reason: String,
    },

    #[error("{mode} retriever timed out after {timeout_secs}s")]
    Timeout { mode: String, timeout_secs: u64 },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Stored record is malformed: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum AccountError {
    #[error("Account service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Malformed account response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum CharacterError {
    #[error("Character '{character}' has {count} style exemplars, at most {max} allowed")]
    TooManyExemplars {
        character: String,
        count: usize,
        max: usize,
    },

    #[error("Unknown character: {0}")]
    NotFound(i64),
}
