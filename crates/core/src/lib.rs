//! # personachat Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! personachat conversational pipeline. This crate has **no runtime
//! dependencies**: it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the pipeline (language model, knowledge
//! index, session store, token ledger, audit log, message bus) is a trait
//! here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod account;
pub mod character;
pub mod error;
pub mod event;
pub mod history;
pub mod locale;
pub mod memory;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use account::AccountService;
pub use character::{Character, StyleExemplar, MAX_STYLE_EXEMPLARS};
pub use error::{Error, Result};
pub use event::{ChatTurnEvent, EventPublisher, TurnIdentity, CHAT_TURN_TOPIC};
pub use history::{clamp_page_size, HistoryPage, HistoryRecord, HistoryRepository};
pub use locale::Locale;
pub use memory::MemoryStore;
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use retrieval::{KnowledgeSource, RetrievalMode, RetrievedChunk, Retriever, ScopedRetriever};
pub use session::SessionKey;
pub use usage::{TokenEstimate, UsageRecord};
