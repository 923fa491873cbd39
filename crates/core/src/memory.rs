//! MemoryStore trait: the durable, keyed home of session history.
//!
//! The store is append-only from the pipeline's point of view. Time-to-live
//! is a property of the store, fixed when the store is opened, and refreshed
//! on every append.

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::Message;
use crate::session::SessionKey;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Backend name (e.g., "in_memory", "redis").
    fn name(&self) -> &str;

    /// Append one message to the end of the session's history.
    async fn append(&self, session: &SessionKey, message: Message) -> Result<(), MemoryError>;

    /// Read the whole history, oldest first. Unknown or expired sessions read as empty.
    async fn read(&self, session: &SessionKey) -> Result<Vec<Message>, MemoryError>;

    /// Drop the session's history. Returns whether anything was removed.
    async fn delete(&self, session: &SessionKey) -> Result<bool, MemoryError>;

    /// Number of stored messages for the session.
    async fn len(&self, session: &SessionKey) -> Result<usize, MemoryError> {
        Ok(self.read(session).await?.len())
    }

    /// Append a completed exchange: the user's input then the assistant's reply.
    async fn append_exchange(
        &self,
        session: &SessionKey,
        input: &str,
        output: &str,
    ) -> Result<(), MemoryError> {
        self.append(session, Message::user(input)).await?;
        self.append(session, Message::assistant(output)).await
    }
}
