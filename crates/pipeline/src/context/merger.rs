//! Hybrid retrieval merge.
//!
//! Two retrievers run against the same character namespace: one ranks by
//! pure relevance, the other by maximal marginal relevance. Their results
//! are concatenated relevance-first, deduplicated on exact chunk text
//! (first occurrence wins), and rendered one line per chunk:
//!
//! ```text
//! [p<page>][<source>] <text, newlines flattened, first N chars>
//! ```

use std::collections::HashSet;
use std::time::Duration;

use personachat_core::error::RetrievalError;
use personachat_core::retrieval::{RetrievedChunk, Retriever};
use tracing::debug;

/// Per-chunk character cap when rendering context.
pub const DEFAULT_CHUNK_CHAR_CAP: usize = 1200;

/// Concatenate `first` then `second`, dropping chunks whose text was already seen.
pub fn merge_chunks(first: Vec<RetrievedChunk>, second: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|chunk| seen.insert(chunk.text.clone()))
        .collect()
}

/// Render a single chunk line. Pages unknown to the source render as `?`.
pub fn render_chunk(chunk: &RetrievedChunk, char_cap: usize) -> String {
    let page = chunk
        .page
        .map(|p| p.to_string())
        .unwrap_or_else(|| "?".to_string());
    let text: String = chunk
        .text
        .trim()
        .replace('\n', " ")
        .chars()
        .take(char_cap)
        .collect();
    format!("[p{page}][{}] {text}", chunk.source)
}

/// Render chunks newline-joined, in order.
pub fn render_context(chunks: &[RetrievedChunk], char_cap: usize) -> String {
    chunks
        .iter()
        .map(|c| render_chunk(c, char_cap))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs both retrievers concurrently and merges their results.
#[derive(Debug, Clone)]
pub struct RetrievalMerger {
    top_k: usize,
    chunk_char_cap: usize,
    timeout: Duration,
}

impl RetrievalMerger {
    pub fn new(top_k: usize, chunk_char_cap: usize, timeout: Duration) -> Self {
        Self {
            top_k,
            chunk_char_cap,
            timeout,
        }
    }

    pub fn chunk_char_cap(&self) -> usize {
        self.chunk_char_cap
    }

    /// Merged, deduplicated chunks. Any retriever failure or timeout fails the whole call.
    pub async fn retrieve(
        &self,
        similarity: &dyn Retriever,
        mmr: &dyn Retriever,
        query: &str,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let (relevant, diverse) = tokio::try_join!(
            self.bounded(similarity, query),
            self.bounded(mmr, query),
        )?;
        let merged = merge_chunks(relevant, diverse);
        debug!(top_k = self.top_k, chunks = merged.len(), "Merged retrieval results");
        Ok(merged)
    }

    async fn bounded(
        &self,
        retriever: &dyn Retriever,
        query: &str,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        tokio::time::timeout(self.timeout, retriever.retrieve(query, self.top_k))
            .await
            .map_err(|_| RetrievalError::Timeout {
                mode: retriever.mode().as_str().to_string(),
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}

impl Default for RetrievalMerger {
    fn default() -> Self {
        Self::new(5, DEFAULT_CHUNK_CHAR_CAP, Duration::from_secs(15))
    }
}
