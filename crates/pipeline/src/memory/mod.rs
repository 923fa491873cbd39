//! Session memory manager.
//!
//! Two implementations of [`ConversationMemory`], chosen by configuration:
//!
//! - [`BufferMemory`] always returns the verbatim history.
//! - [`SummaryBufferMemory`] returns the verbatim history until its
//!   estimated size passes a token limit, then returns a single summary
//!   message followed by the most recent messages.
//!
//! Both read from and append to the same [`MemoryStore`]. Summaries are a
//! read view only; the stored log is never rewritten.
//!
//! [`MemoryStore`]: personachat_core::MemoryStore

pub mod buffer;
pub mod summary;

pub use buffer::BufferMemory;
pub use summary::{LlmSummarizer, Summarizer, SummaryBufferMemory};

use async_trait::async_trait;
use personachat_core::error::MemoryError;
use personachat_core::message::Message;
use personachat_core::session::SessionKey;

use crate::context::ExchangeLabels;

/// History as it is injected into one prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryView {
    pub messages: Vec<Message>,
    /// The first message is a synthetic summary of older turns.
    pub summarized: bool,
    /// Older messages were dropped without a summary.
    pub truncated: bool,
}

impl MemoryView {
    pub fn verbatim(messages: Vec<Message>) -> Self {
        Self {
            messages,
            summarized: false,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn render(&self, labels: &ExchangeLabels) -> String {
        format_history(&self.messages, labels)
    }
}

/// One `<label>: <text>` line per message.
pub fn format_history(messages: &[Message], labels: &ExchangeLabels) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", labels.label_for(&m.role), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read/write access to a session's conversational memory.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    fn name(&self) -> &str;

    /// The view a turn should inject into its prompt.
    async fn load(&self, session: &SessionKey) -> Result<MemoryView, MemoryError>;

    /// Persist a completed exchange.
    async fn save_exchange(
        &self,
        session: &SessionKey,
        input: &str,
        output: &str,
    ) -> Result<(), MemoryError>;

    /// Number of persisted messages.
    async fn message_count(&self, session: &SessionKey) -> Result<usize, MemoryError>;

    /// Forget the session. Returns whether anything was stored.
    async fn clear(&self, session: &SessionKey) -> Result<bool, MemoryError>;
}
