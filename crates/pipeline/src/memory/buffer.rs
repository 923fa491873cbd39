//! Verbatim buffer memory.

use std::sync::Arc;

use async_trait::async_trait;
use personachat_core::error::MemoryError;
use personachat_core::memory::MemoryStore;
use personachat_core::session::SessionKey;

use super::{ConversationMemory, MemoryView};

/// Returns the whole stored history, unchanged.
pub struct BufferMemory {
    store: Arc<dyn MemoryStore>,
}

impl BufferMemory {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConversationMemory for BufferMemory {
    fn name(&self) -> &str {
        "buffer"
    }

    async fn load(&self, session: &SessionKey) -> Result<MemoryView, MemoryError> {
        Ok(MemoryView::verbatim(self.store.read(session).await?))
    }

    async fn save_exchange(
        &self,
        session: &SessionKey,
        input: &str,
        output: &str,
    ) -> Result<(), MemoryError> {
        self.store.append_exchange(session, input, output).await
    }

    async fn message_count(&self, session: &SessionKey) -> Result<usize, MemoryError> {
        self.store.len(session).await
    }

    async fn clear(&self, session: &SessionKey) -> Result<bool, MemoryError> {
        self.store.delete(session).await
    }
}
