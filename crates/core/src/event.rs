//! Turn events and the publisher contract.
//!
//! Every turn attempt that reaches the model produces exactly one
//! [`ChatTurnEvent`]. Publishing is best-effort: publishers report success
//! as a `bool` and never propagate transport errors into the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::usage::UsageRecord;

/// Default topic for turn events.
pub const CHAT_TURN_TOPIC: &str = "chatbot-chat-request";

/// Immutable record of one completed or failed turn.
///
/// The serialized field set is a wire contract; optional fields serialize
/// as `null`, never omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurnEvent {
    pub chatbot_id: i64,
    pub user_id: String,
    pub session_id: String,
    pub content: String,
    pub answer: Option<String>,
    pub content_token_count: u64,
    pub answer_token_count: Option<u64>,
    pub total_token_count: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub response_time_ms: Option<u64>,
    pub model_name: String,
}

/// Identity fields shared by success and failure events.
#[derive(Debug, Clone)]
pub struct TurnIdentity<'a> {
    pub chatbot_id: i64,
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub content: &'a str,
    pub model_name: &'a str,
}

impl ChatTurnEvent {
    pub fn succeeded(id: TurnIdentity<'_>, answer: &str, usage: &UsageRecord, response_time_ms: u64) -> Self {
        Self {
            chatbot_id: id.chatbot_id,
            user_id: id.user_id.to_string(),
            session_id: id.session_id.to_string(),
            content: id.content.to_string(),
            answer: Some(answer.to_string()),
            content_token_count: usage.prompt_tokens,
            answer_token_count: Some(usage.completion_tokens),
            total_token_count: usage.total_tokens,
            success: true,
            error_message: None,
            response_time_ms: Some(response_time_ms),
            model_name: id.model_name.to_string(),
        }
    }

    /// A failed turn: no answer, no answer token count.
    pub fn failed(
        id: TurnIdentity<'_>,
        error_message: impl Into<String>,
        usage: &UsageRecord,
        response_time_ms: Option<u64>,
    ) -> Self {
        Self {
            chatbot_id: id.chatbot_id,
            user_id: id.user_id.to_string(),
            session_id: id.session_id.to_string(),
            content: id.content.to_string(),
            answer: None,
            content_token_count: usage.prompt_tokens,
            answer_token_count: None,
            total_token_count: usage.total_tokens,
            success: false,
            error_message: Some(error_message.into()),
            response_time_ms,
            model_name: id.model_name.to_string(),
        }
    }
}

/// Best-effort message bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    fn name(&self) -> &str;

    /// Publish `message` on `topic` with a partition `key`.
    /// Returns `false` when delivery failed; never retries.
    async fn publish(&self, topic: &str, message: &serde_json::Value, key: &str) -> bool;
}
