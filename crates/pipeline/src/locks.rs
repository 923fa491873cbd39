//! Per-session mutual exclusion.
//!
//! Turns for the same session take the session's lock for their whole
//! read, generate and write cycle, so two concurrent turns cannot both
//! read the same history and then append over each other. Different
//! sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use personachat_core::session::SessionKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lazily created async mutexes keyed by session.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the session's lock. Idle entries are pruned on the way in.
    pub async fn acquire(&self, session: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|key, lock| key == session || Arc::strong_count(lock) > 1);
            locks.entry(session.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Sessions with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
