//! Session identity.

use serde::{Deserialize, Serialize};

/// Opaque session key derived from chatbot identity and caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// The canonical key for one caller talking to one chatbot.
    pub fn derive(chatbot_id: i64, user_id: &str) -> Self {
        Self(format!("chatbot:{chatbot_id}:user:{user_id}"))
    }

    /// Wrap an externally supplied session id.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partition key for turn events: all of one user's turns against one
/// chatbot share it.
pub fn event_partition_key(chatbot_id: i64, user_id: &str) -> String {
    format!("{chatbot_id}:{user_id}")
}
