//! Redis session store.
//!
//! Each session is a Redis list of JSON-encoded messages under
//! `<prefix><session>`. Every append pushes to the tail and resets the
//! key's expiry, so idle sessions age out on their own.

use std::time::Duration;

use async_trait::async_trait;
use personachat_core::error::MemoryError;
use personachat_core::{MemoryStore, Message, SessionKey};
use redis::aio::ConnectionManager;
use tracing::{debug, info};

const DEFAULT_PREFIX: &str = "message_store:";

pub struct RedisSessionStore {
    conn: ConnectionManager,
    ttl: Duration,
    prefix: String,
}

impl RedisSessionStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, MemoryError> {
        let client = redis::Client::open(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid Redis URL: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to connect to Redis: {e}")))?;
        info!("Redis session store connected (ttl {}s)", ttl.as_secs());
        Ok(Self {
            conn,
            ttl,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, session: &SessionKey) -> String {
        format!("{}{}", self.prefix, session)
    }

    /// One MULTI/EXEC round trip: a single RPUSH of every message, then EXPIRE.
    async fn push(&self, session: &SessionKey, messages: &[Message]) -> Result<(), MemoryError> {
        let payloads = messages
            .iter()
            .map(|m| serde_json::to_string(m).map_err(|e| MemoryError::Serialization(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.conn.clone();
        push_pipeline(&self.key(session), &payloads, self.ttl)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("RPUSH failed: {e}")))
    }
}

fn push_pipeline(key: &str, payloads: &[String], ttl: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("RPUSH")
        .arg(key)
        .arg(payloads)
        .ignore()
        .cmd("EXPIRE")
        .arg(key)
        .arg(ttl.as_secs())
        .ignore();
    pipe
}

#[async_trait]
impl MemoryStore for RedisSessionStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn append(&self, session: &SessionKey, message: Message) -> Result<(), MemoryError> {
        self.push(session, &[message]).await?;
        debug!(%session, "Appended message to Redis");
        Ok(())
    }

    async fn append_exchange(
        &self,
        session: &SessionKey,
        input: &str,
        output: &str,
    ) -> Result<(), MemoryError> {
        self.push(session, &[Message::user(input), Message::assistant(output)])
            .await?;
        debug!(%session, "Appended exchange to Redis");
        Ok(())
    }

    async fn read(&self, session: &SessionKey) -> Result<Vec<Message>, MemoryError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key(session))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("LRANGE failed: {e}")))?;

        raw.iter()
            .map(|item| {
                serde_json::from_str(item).map_err(|e| MemoryError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn delete(&self, session: &SessionKey) -> Result<bool, MemoryError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key(session))
            .query_async(&mut conn)
            .await
            .map_err(|e| MemoryError::Storage(format!("DEL failed: {e}")))?;
        Ok(removed > 0)
    }

    async fn len(&self, session: &SessionKey) -> Result<usize, MemoryError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(self.key(session))
            .query_async(&mut conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("LLEN failed: {e}")))?;
        Ok(len)
    }
}
