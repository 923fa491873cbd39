//! Audit history of completed turns.
//!
//! Distinct from the [`MemoryStore`](crate::memory::MemoryStore): this log is
//! for paginated, user-facing history and never feeds prompt assembly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// One saved exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Monotonic id; also the pagination cursor.
    pub id: i64,
    pub session_id: String,
    pub input_text: String,
    pub output_text: String,
    pub created_at: DateTime<Utc>,
}

/// A page of history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryRecord>,
    /// Pass as `cursor` to fetch the following page.
    pub next_cursor: Option<i64>,
    pub has_next: bool,
}

impl HistoryPage {
    /// Build a page from a `size + 1` over-fetch, ordered newest first.
    ///
    /// A `size` of zero is treated as one.
    pub fn from_overfetch(mut rows: Vec<HistoryRecord>, size: usize) -> Self {
        let size = clamp_page_size(size);
        let has_next = rows.len() > size;
        rows.truncate(size);
        let next_cursor = if has_next { rows.last().map(|r| r.id) } else { None };
        Self {
            items: rows,
            next_cursor,
            has_next,
        }
    }
}

/// Smallest page a repository will serve.
pub fn clamp_page_size(size: usize) -> usize {
    size.max(1)
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    fn name(&self) -> &str;

    /// Append one exchange; returns the new record id.
    async fn save(&self, session_id: &str, input_text: &str, output_text: &str) -> Result<i64, MemoryError>;

    /// Records with id strictly below `cursor` (or the newest when `None`).
    async fn find_page(&self, session_id: &str, cursor: Option<i64>, size: usize) -> Result<HistoryPage, MemoryError>;

    /// Remove every record of a session; returns the number removed.
    async fn delete_by_session(&self, session_id: &str) -> Result<u64, MemoryError>;

    /// Remove one record by id.
    async fn delete(&self, id: i64) -> Result<bool, MemoryError>;
}
