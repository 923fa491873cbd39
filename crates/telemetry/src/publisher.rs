//! Event publishers for turn events.
//!
//! All publishers are best-effort: a failed publish is logged and reported
//! as `false`, never raised.

use std::sync::Arc;

use async_trait::async_trait;
use personachat_core::EventPublisher;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A message as seen by broadcast subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// In-process pub/sub over `tokio::sync::broadcast`.
///
/// Subscribers see every event in publish order. Publishing with no
/// subscribers succeeds.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Arc<PublishedEvent>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PublishedEvent>> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn publish(&self, topic: &str, message: &serde_json::Value, key: &str) -> bool {
        let event = Arc::new(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: message.clone(),
        });
        match self.sender.send(event) {
            Ok(receivers) => debug!(topic, key, receivers, "Event broadcast"),
            Err(_) => debug!(topic, key, "Event broadcast with no subscribers"),
        }
        true
    }
}

/// Writes each event to the log at `info` level.
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, topic: &str, message: &serde_json::Value, key: &str) -> bool {
        info!(topic, key, payload = %message, "Turn event");
        true
    }
}

#[cfg(feature = "redis")]
pub use redis_stream::RedisStreamPublisher;

#[cfg(feature = "redis")]
mod redis_stream {
    use async_trait::async_trait;
    use personachat_core::EventPublisher;
    use redis::aio::ConnectionManager;
    use tracing::{debug, warn};

    use crate::TelemetryError;

    /// Appends events to a Redis stream named after the topic.
    ///
    /// Entries carry `key` and `payload` fields; consumers group by key to
    /// keep one user's turns in order.
    pub struct RedisStreamPublisher {
        conn: ConnectionManager,
        max_len: Option<usize>,
    }

    impl RedisStreamPublisher {
        pub async fn connect(url: &str) -> Result<Self, TelemetryError> {
            let client =
                redis::Client::open(url).map_err(|e| TelemetryError::Connection(e.to_string()))?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|e| TelemetryError::Connection(e.to_string()))?;
            Ok(Self { conn, max_len: None })
        }

        /// Cap the stream length (approximate trimming).
        pub fn with_max_len(mut self, max_len: usize) -> Self {
            self.max_len = Some(max_len);
            self
        }
    }

    #[async_trait]
    impl EventPublisher for RedisStreamPublisher {
        fn name(&self) -> &str {
            "redis"
        }

        async fn publish(&self, topic: &str, message: &serde_json::Value, key: &str) -> bool {
            let mut conn = self.conn.clone();
            let mut cmd = redis::cmd("XADD");
            cmd.arg(topic);
            if let Some(max_len) = self.max_len {
                cmd.arg("MAXLEN").arg("~").arg(max_len);
            }
            cmd.arg("*")
                .arg("key")
                .arg(key)
                .arg("payload")
                .arg(message.to_string());

            match cmd.query_async::<String>(&mut conn).await {
                Ok(id) => {
                    debug!(topic, key, id = %id, "Event appended to Redis stream");
                    true
                }
                Err(e) => {
                    warn!(topic, key, error = %e, "Failed to publish turn event");
                    false
                }
            }
        }
    }
}
