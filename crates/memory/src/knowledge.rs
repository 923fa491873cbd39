//! In-process knowledge base serving both retrieval modes.
//!
//! Passages are grouped by namespace (one per character). Similarity mode
//! ranks by term-vector cosine; MMR mode re-ranks the top `fetch_k`
//! candidates for diversity. Documents are plain text; a form feed
//! (`\x0c`) separates pages and blank lines separate passages.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use personachat_core::error::RetrievalError;
use personachat_core::{KnowledgeSource, RetrievalMode, RetrievedChunk};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::vector::{cosine_similarity, mmr_select, term_vector, TermVector};

struct Passage {
    chunk: RetrievedChunk,
    terms: TermVector,
}

pub struct KeywordKnowledgeBase {
    namespaces: RwLock<HashMap<String, Vec<Passage>>>,
    fetch_k: usize,
    lambda: f32,
}

impl KeywordKnowledgeBase {
    pub fn new(fetch_k: usize, lambda: f32) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            fetch_k,
            lambda,
        }
    }

    /// Add one passage.
    pub async fn add_chunk(&self, namespace: &str, chunk: RetrievedChunk) {
        let terms = term_vector(&chunk.text);
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .push(Passage { chunk, terms });
    }

    /// Split a document into pages and passages and add them all.
    /// Returns the number of passages added.
    pub async fn add_document(&self, namespace: &str, source: &str, text: &str) -> usize {
        let mut added = 0;
        for (page_idx, page) in text.split('\x0c').enumerate() {
            for passage in page.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                let chunk = RetrievedChunk::new(passage, Some(page_idx as u32 + 1), source);
                self.add_chunk(namespace, chunk).await;
                added += 1;
            }
        }
        added
    }

    /// Load `<dir>/<namespace>/*.txt`.
    pub async fn load_dir(&self, dir: &Path) -> std::io::Result<usize> {
        let mut total = 0;
        let mut namespaces = tokio::fs::read_dir(dir).await?;
        while let Some(ns_entry) = namespaces.next_entry().await? {
            if !ns_entry.file_type().await?.is_dir() {
                continue;
            }
            let namespace = ns_entry.file_name().to_string_lossy().into_owned();
            let mut files = tokio::fs::read_dir(ns_entry.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                let text = tokio::fs::read_to_string(&path).await?;
                let source = file.file_name().to_string_lossy().into_owned();
                total += self.add_document(&namespace, &source, &text).await;
            }
        }
        info!("Loaded {total} passages from {}", dir.display());
        Ok(total)
    }

    /// Number of passages in a namespace.
    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl KnowledgeSource for KeywordKnowledgeBase {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let namespaces = self.namespaces.read().await;
        let Some(passages) = namespaces.get(namespace) else {
            debug!(namespace, "Empty knowledge namespace");
            return Ok(Vec::new());
        };

        let query_terms = term_vector(query);
        let mut ranked: Vec<(f32, &Passage)> = passages
            .iter()
            .map(|p| (cosine_similarity(&query_terms, &p.terms), p))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let picked: Vec<&Passage> = match mode {
            RetrievalMode::Similarity => ranked.iter().take(k).map(|(_, p)| *p).collect(),
            RetrievalMode::Mmr => {
                ranked.truncate(self.fetch_k.max(k));
                let relevance: Vec<f32> = ranked.iter().map(|(s, _)| *s).collect();
                mmr_select(&relevance, k, self.lambda, |a, b| {
                    cosine_similarity(&ranked[a].1.terms, &ranked[b].1.terms)
                })
                .into_iter()
                .map(|i| ranked[i].1)
                .collect()
            }
        };

        debug!(namespace, mode = mode.as_str(), hits = picked.len(), "Knowledge search");
        Ok(picked.into_iter().map(|p| p.chunk.clone()).collect())
    }
}
