//! In-memory session store: useful for testing and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use personachat_core::error::MemoryError;
use personachat_core::{MemoryStore, Message, SessionKey};
use tokio::sync::RwLock;
use tokio::time::Instant;

struct SessionEntry {
    messages: Vec<Message>,
    expires_at: Instant,
}

/// A session store that keeps history in a map with a sliding TTL.
///
/// Expired sessions read as empty and are purged lazily on the next write.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionEntry>>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn push(&self, session: &SessionKey, messages: impl IntoIterator<Item = Message>) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, entry| entry.expires_at > now);
        let entry = sessions.entry(session.clone()).or_insert_with(|| SessionEntry {
            messages: Vec::new(),
            expires_at: now,
        });
        entry.messages.extend(messages);
        entry.expires_at = now + self.ttl;
    }

    /// Number of sessions currently held, expired or not.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl MemoryStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, session: &SessionKey, message: Message) -> Result<(), MemoryError> {
        self.push(session, [message]).await;
        Ok(())
    }

    async fn append_exchange(
        &self,
        session: &SessionKey,
        input: &str,
        output: &str,
    ) -> Result<(), MemoryError> {
        self.push(session, [Message::user(input), Message::assistant(output)])
            .await;
        Ok(())
    }

    async fn read(&self, session: &SessionKey) -> Result<Vec<Message>, MemoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.messages.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, session: &SessionKey) -> Result<bool, MemoryError> {
        Ok(self.sessions.write().await.remove(session).is_some())
    }
}
