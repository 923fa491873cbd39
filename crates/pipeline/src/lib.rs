//! # personachat Pipeline
//!
//! Turns one user message into one in-character reply under a token budget:
//!
//! ```text
//! input ──► retrieval merge ─┐
//!        ├► memory view ─────┼─► prompt ─► estimate ─► budget gate ─► model ─► accounting
//!        └► style exemplars ─┘
//! ```
//!
//! - [`context`]: retrieval merge, style exemplars, prompt assembly, token counting
//! - [`memory`]: buffer and summary-buffer session memory
//! - [`budget`]: token estimator and budget gate
//! - [`invoker`]: model call with usage collection and estimated fallback
//! - [`accountant`]: turn events, session memory writes, audit history
//! - [`turn`]: the [`ChatPipeline`] tying it together

pub mod accountant;
pub mod budget;
pub mod builder;
pub mod context;
pub mod invoker;
pub mod locks;
pub mod memory;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accountant::{TurnContext, UsageAccountant};
pub use budget::{BudgetGate, TokenEstimator};
pub use builder::{labels_from_config, pricing_from_config, Collaborators};
pub use invoker::{Invocation, InvocationFailure, ModelInvoker, UsageSource};
pub use locks::SessionLocks;
pub use memory::{BufferMemory, ConversationMemory, LlmSummarizer, MemoryView, Summarizer, SummaryBufferMemory};
pub use turn::{ChatPipeline, HistoryCleared, PipelineParts, PreparedTurn, TurnOutcome, TurnRequest};
