//! In-memory audit history.

use async_trait::async_trait;
use chrono::Utc;
use personachat_core::error::MemoryError;
use personachat_core::{clamp_page_size, HistoryPage, HistoryRecord, HistoryRepository};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: Vec<HistoryRecord>,
}

/// Append-only history held in a Vec. Ids start at 1 and only grow.
#[derive(Default)]
pub struct InMemoryHistoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, session_id: &str, input_text: &str, output_text: &str) -> Result<i64, MemoryError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(HistoryRecord {
            id,
            session_id: session_id.to_string(),
            input_text: input_text.to_string(),
            output_text: output_text.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_page(&self, session_id: &str, cursor: Option<i64>, size: usize) -> Result<HistoryPage, MemoryError> {
        let size = clamp_page_size(size);
        let inner = self.inner.read().await;
        let rows: Vec<HistoryRecord> = inner
            .records
            .iter()
            .rev()
            .filter(|r| r.session_id == session_id)
            .filter(|r| cursor.is_none_or(|c| r.id < c))
            .take(size + 1)
            .cloned()
            .collect();
        Ok(HistoryPage::from_overfetch(rows, size))
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<u64, MemoryError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.session_id != session_id);
        Ok((before - inner.records.len()) as u64)
    }

    async fn delete(&self, id: i64) -> Result<bool, MemoryError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() < before)
    }
}
