//! Post-call accounting: turn events, session memory and the audit log.
//!
//! A successful turn publishes its event first, then appends the exchange
//! to session memory and the audit history. A failed model call publishes
//! a failure event and writes nothing else.

use std::sync::Arc;

use personachat_core::error::Result;
use personachat_core::event::{ChatTurnEvent, EventPublisher, TurnIdentity, CHAT_TURN_TOPIC};
use personachat_core::history::HistoryRepository;
use personachat_core::session::{event_partition_key, SessionKey};
use tracing::{debug, warn};

use crate::invoker::{Invocation, InvocationFailure};
use crate::memory::ConversationMemory;

/// Who and what a turn was about.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub chatbot_id: i64,
    pub user_id: &'a str,
    pub session: &'a SessionKey,
    pub input: &'a str,
    pub model_name: &'a str,
}

impl<'a> TurnContext<'a> {
    fn identity(&self) -> TurnIdentity<'a> {
        TurnIdentity {
            chatbot_id: self.chatbot_id,
            user_id: self.user_id,
            session_id: self.session.as_str(),
            content: self.input,
            model_name: self.model_name,
        }
    }
}

pub struct UsageAccountant {
    memory: Arc<dyn ConversationMemory>,
    history: Arc<dyn HistoryRepository>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl UsageAccountant {
    pub fn new(
        memory: Arc<dyn ConversationMemory>,
        history: Arc<dyn HistoryRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            memory,
            history,
            publisher,
            topic: CHAT_TURN_TOPIC.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Account for a completed call. Returns whether an event was delivered.
    ///
    /// With `emit_event` off the exchange is still persisted.
    pub async fn record_success(
        &self,
        ctx: TurnContext<'_>,
        invocation: &Invocation,
        emit_event: bool,
    ) -> Result<bool> {
        let published = if emit_event {
            let event = ChatTurnEvent::succeeded(
                ctx.identity(),
                &invocation.answer,
                &invocation.usage,
                invocation.elapsed.as_millis() as u64,
            );
            self.publish(&ctx, &event).await
        } else {
            false
        };

        self.memory
            .save_exchange(ctx.session, ctx.input, &invocation.answer)
            .await?;
        let history_id = self
            .history
            .save(ctx.session.as_str(), ctx.input, &invocation.answer)
            .await?;
        debug!(session = %ctx.session, history_id, "Turn persisted");

        Ok(published)
    }

    /// Account for a failed call: one failure event, no history.
    pub async fn record_failure(&self, ctx: TurnContext<'_>, failure: &InvocationFailure) -> bool {
        let event = ChatTurnEvent::failed(
            ctx.identity(),
            failure.error.to_string(),
            &failure.usage,
            Some(failure.elapsed.as_millis() as u64),
        );
        self.publish(&ctx, &event).await
    }

    async fn publish(&self, ctx: &TurnContext<'_>, event: &ChatTurnEvent) -> bool {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to serialize turn event");
                return false;
            }
        };
        let key = event_partition_key(ctx.chatbot_id, ctx.user_id);
        let delivered = self.publisher.publish(&self.topic, &payload, &key).await;
        if !delivered {
            warn!(
                publisher = self.publisher.name(),
                topic = %self.topic,
                %key,
                "Turn event was not delivered"
            );
        }
        delivered
    }
}
