//! Configuration loading, validation, and management for personachat.
//!
//! Loads configuration from `~/.personachat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use personachat_core::{Character, Locale, MAX_STYLE_EXEMPLARS};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.personachat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model that answers in character
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default)]
    pub default_temperature: f32,

    /// Prompt language and role labels
    #[serde(default)]
    pub locale: Locale,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Session memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Knowledge retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Pre-flight token estimation
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Token ledger
    #[serde(default)]
    pub account: AccountConfig,

    /// Turn event sink
    #[serde(default)]
    pub events: EventsConfig,

    /// Audit history
    #[serde(default)]
    pub history: HistoryConfig,

    /// Turn orchestration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Pricing overrides (model name → per-million prices)
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,

    /// Personas this deployment can play
    #[serde(default)]
    pub characters: Vec<Character>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-5".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("locale", &self.locale)
            .field("providers", &self.providers)
            .field("memory", &self.memory)
            .field("retrieval", &self.retrieval)
            .field("estimator", &self.estimator)
            .field("account", &self.account)
            .field("events", &self.events)
            .field("history", &self.history)
            .field("pipeline", &self.pipeline)
            .field("pricing", &self.pricing)
            .field("characters", &self.characters.len())
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Which session memory strategy builds the history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Verbatim history, never summarized.
    Buffer,
    /// Verbatim until the token limit, then summary + recent messages.
    SummaryBuffer,
}

/// Where session history is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    InMemory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_kind")]
    pub kind: MemoryKind,

    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackendKind,

    /// History token estimate above which the view is summarized
    #[serde(default = "default_max_token_limit")]
    pub max_token_limit: usize,

    /// Messages kept verbatim after the summary
    #[serde(default = "default_recent_k")]
    pub recent_k: usize,

    /// Session time-to-live, refreshed on every append
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_summary_timeout_secs")]
    pub summary_timeout_secs: u64,

    /// Overrides the locale's label for user messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_label: Option<String>,

    /// Overrides the locale's label for assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

fn default_memory_kind() -> MemoryKind {
    MemoryKind::SummaryBuffer
}
fn default_memory_backend() -> MemoryBackendKind {
    MemoryBackendKind::InMemory
}
fn default_max_token_limit() -> usize {
    500
}
fn default_recent_k() -> usize {
    4
}
fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_summary_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_summary_timeout_secs() -> u64 {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            kind: default_memory_kind(),
            backend: default_memory_backend(),
            max_token_limit: default_max_token_limit(),
            recent_k: default_recent_k(),
            ttl_secs: default_ttl_secs(),
            summary_model: default_summary_model(),
            summary_timeout_secs: default_summary_timeout_secs(),
            user_label: None,
            assistant_label: None,
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks requested from each retriever
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters of chunk text kept when rendering context
    #[serde(default = "default_chunk_char_cap")]
    pub chunk_char_cap: usize,

    /// Candidate pool for MMR re-ranking
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// 1.0 = pure relevance, 0.0 = pure diversity
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,

    /// Directory holding `<character_id>/*.txt` documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_dir: Option<PathBuf>,

    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_chunk_char_cap() -> usize {
    1200
}
fn default_fetch_k() -> usize {
    20
}
fn default_mmr_lambda() -> f32 {
    0.5
}
fn default_retrieval_timeout_secs() -> u64 {
    15
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            chunk_char_cap: default_chunk_char_cap(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
            knowledge_dir: None,
            timeout_secs: default_retrieval_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Tokenizer profile
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Scale applied to the raw prompt count, in (0, 1]
    #[serde(default = "default_correction_factor")]
    pub correction_factor: f64,

    /// Tokens reserved for the reply
    #[serde(default = "default_completion_allowance")]
    pub completion_allowance: u64,
}

fn default_encoding() -> String {
    "cl100k_base".into()
}
fn default_correction_factor() -> f64 {
    0.85
}
fn default_completion_allowance() -> u64 {
    500
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            correction_factor: default_correction_factor(),
            completion_allowance: default_completion_allowance(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Every user has the same fixed balance
    Fixed,
    /// Ask a remote ledger over HTTP
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_kind")]
    pub kind: AccountKind,

    #[serde(default = "default_fixed_remaining")]
    pub fixed_remaining: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_account_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_account_kind() -> AccountKind {
    AccountKind::Fixed
}
fn default_fixed_remaining() -> u64 {
    100_000
}
fn default_account_timeout_secs() -> u64 {
    10
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            kind: default_account_kind(),
            fixed_remaining: default_fixed_remaining(),
            base_url: None,
            timeout_secs: default_account_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkKind {
    Log,
    Broadcast,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_sink")]
    pub sink: EventSinkKind,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

fn default_event_sink() -> EventSinkKind {
    EventSinkKind::Log
}
fn default_topic() -> String {
    personachat_core::CHAT_TURN_TOPIC.into()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: default_event_sink(),
            topic: default_topic(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    InMemory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_kind")]
    pub kind: HistoryKind,

    /// Defaults to `~/.personachat/history.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

fn default_history_kind() -> HistoryKind {
    HistoryKind::Sqlite
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            kind: default_history_kind(),
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run turns of the same session one at a time
    #[serde(default = "default_true")]
    pub serialize_sessions: bool,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
}

fn default_model_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            serialize_sessions: true,
            model_timeout_secs: default_model_timeout_secs(),
        }
    }
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.personachat/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides and validate.
    ///
    /// Environment variables checked:
    /// - `PERSONACHAT_API_KEY` (highest priority), `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`
    /// - `PERSONACHAT_PROVIDER`, `PERSONACHAT_MODEL`
    /// - `PERSONACHAT_REDIS_URL`, `PERSONACHAT_ACCOUNT_URL`
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PERSONACHAT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PERSONACHAT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PERSONACHAT_MODEL") {
            config.default_model = model;
        }

        if let Ok(url) = std::env::var("PERSONACHAT_REDIS_URL") {
            config.memory.redis_url.get_or_insert_with(|| url.clone());
            config.events.redis_url.get_or_insert(url);
        }

        if let Ok(url) = std::env::var("PERSONACHAT_ACCOUNT_URL") {
            config.account.base_url = Some(url);
            config.account.kind = AccountKind::Http;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".personachat")
    }

    /// Audit-history database path, defaulting under the config directory.
    pub fn history_db_path(&self) -> PathBuf {
        self.history
            .sqlite_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("history.db"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let factor = self.estimator.correction_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::ValidationError(
                "estimator.correction_factor must be in (0.0, 1.0]".into(),
            ));
        }

        if self.memory.recent_k == 0 {
            return Err(ConfigError::ValidationError("memory.recent_k must be >= 1".into()));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be >= 1".into()));
        }

        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(ConfigError::ValidationError(
                "retrieval.mmr_lambda must be between 0.0 and 1.0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for character in &self.characters {
            if !seen.insert(character.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate character id {}",
                    character.id
                )));
            }
            if character.style_exemplars.len() > MAX_STYLE_EXEMPLARS {
                return Err(ConfigError::ValidationError(format!(
                    "character '{}' has {} style exemplars, at most {MAX_STYLE_EXEMPLARS} allowed",
                    character.name,
                    character.style_exemplars.len()
                )));
            }
        }

        Ok(())
    }

    /// Look up a configured character.
    pub fn character(&self, id: i64) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let mut config = Self::default();
        config.characters.push(Character {
            id: 1,
            name: "Guide".into(),
            description: "A friendly museum guide who answers questions about the collection.".into(),
            style_exemplars: vec![personachat_core::StyleExemplar::new(
                "What's your favourite exhibit?",
                "Oh, the star charts on the second floor, without a doubt!",
            )],
        });
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: 0.0,
            locale: Locale::default(),
            providers: HashMap::new(),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            estimator: EstimatorConfig::default(),
            account: AccountConfig::default(),
            events: EventsConfig::default(),
            history: HistoryConfig::default(),
            pipeline: PipelineConfig::default(),
            pricing: HashMap::new(),
            characters: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for personachat_core::Error {
    fn from(e: ConfigError) -> Self {
        personachat_core::Error::Config { message: e.to_string() }
    }
}
