//! Retrieval contracts: chunks of background knowledge and the retrievers
//! that produce them.
//!
//! A [`KnowledgeSource`] is the shared, externally-owned index. A
//! [`Retriever`] is a view of one source bound to one character namespace
//! and one [`RetrievalMode`]; the pipeline only ever talks to retrievers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A retrieved passage with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Page or section number, when the source document has one.
    #[serde(default)]
    pub page: Option<u32>,
    pub source: String,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>, page: Option<u32>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page,
            source: source.into(),
        }
    }
}

/// How a retriever ranks candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Pure relevance ranking.
    Similarity,
    /// Maximal marginal relevance: relevance traded against diversity.
    Mmr,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Similarity => "similarity",
            RetrievalMode::Mmr => "mmr",
        }
    }
}

/// A retriever scoped to one namespace and one mode.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn mode(&self) -> RetrievalMode;

    /// Return up to `k` chunks for `query`.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// A searchable knowledge index shared across characters.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Binds a [`KnowledgeSource`] to a namespace and mode.
pub struct ScopedRetriever {
    source: Arc<dyn KnowledgeSource>,
    namespace: String,
    mode: RetrievalMode,
}

impl ScopedRetriever {
    pub fn new(source: Arc<dyn KnowledgeSource>, namespace: impl Into<String>, mode: RetrievalMode) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            mode,
        }
    }

    /// The (similarity, mmr) pair for a namespace.
    pub fn pair(source: Arc<dyn KnowledgeSource>, namespace: &str) -> (Self, Self) {
        (
            Self::new(source.clone(), namespace, RetrievalMode::Similarity),
            Self::new(source, namespace, RetrievalMode::Mmr),
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Retriever for ScopedRetriever {
    fn mode(&self) -> RetrievalMode {
        self.mode
    }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.source.search(&self.namespace, query, k, self.mode).await
    }
}
