//! Shared test doubles for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use personachat_core::error::{AccountError, ProviderError, RetrievalError};
use personachat_core::message::Message;
use personachat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use personachat_core::retrieval::{KnowledgeSource, RetrievalMode, RetrievedChunk, Retriever};
use personachat_core::{AccountService, EventPublisher};

// ── Providers ─────────────────────────────────────────────────────────────

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// A text response with typed usage 10/5/15.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A text response carrying no usage data anywhere.
pub fn make_unmetered_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        usage: None,
        ..make_text_response(text)
    }
}

/// Always fails with a 500.
pub struct FailingProvider {
    message: String,
}

impl FailingProvider {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 500,
            message: self.message.clone(),
        })
    }
}

/// Answers only after `delay`.
pub struct SlowProvider {
    delay: Duration,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(make_text_response("late"))
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

fn chunks(texts: &[&str]) -> Vec<RetrievedChunk> {
    texts.iter().map(|t| RetrievedChunk::new(*t, Some(1), "kb")).collect()
}

/// Returns the same chunks for every query and counts calls.
pub struct StaticRetriever {
    mode: RetrievalMode,
    chunks: Vec<RetrievedChunk>,
    calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn new(mode: RetrievalMode, texts: &[&str]) -> Self {
        Self {
            mode,
            chunks: chunks(texts),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn mode(&self) -> RetrievalMode {
        self.mode
    }

    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}

pub struct FailingRetriever {
    mode: RetrievalMode,
}

impl FailingRetriever {
    pub fn new(mode: RetrievalMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Retriever for FailingRetriever {
    fn mode(&self) -> RetrievalMode {
        self.mode
    }

    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Err(RetrievalError::Backend {
            mode: self.mode.as_str().into(),
            namespace: "test".into(),
            reason: "index offline".into(),
        })
    }
}

pub struct SlowRetriever {
    mode: RetrievalMode,
    delay: Duration,
}

impl SlowRetriever {
    pub fn new(mode: RetrievalMode, delay: Duration) -> Self {
        Self { mode, delay }
    }
}

#[async_trait]
impl Retriever for SlowRetriever {
    fn mode(&self) -> RetrievalMode {
        self.mode
    }

    async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

/// Knowledge source answering with fixed chunks per mode, any namespace.
pub struct ModeKnowledge {
    similarity: Vec<RetrievedChunk>,
    mmr: Vec<RetrievedChunk>,
}

impl ModeKnowledge {
    pub fn new(similarity: &[&str], mmr: &[&str]) -> Self {
        Self {
            similarity: chunks(similarity),
            mmr: chunks(mmr),
        }
    }
}

#[async_trait]
impl KnowledgeSource for ModeKnowledge {
    fn name(&self) -> &str {
        "mode_knowledge"
    }

    async fn search(
        &self,
        _namespace: &str,
        _query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let source = match mode {
            RetrievalMode::Similarity => &self.similarity,
            RetrievalMode::Mmr => &self.mmr,
        };
        Ok(source.iter().take(k).cloned().collect())
    }
}

// ── Accounts and events ───────────────────────────────────────────────────

pub struct FixedAccount {
    remaining: u64,
}

impl FixedAccount {
    pub fn new(remaining: u64) -> Self {
        Self { remaining }
    }
}

#[async_trait]
impl AccountService for FixedAccount {
    fn name(&self) -> &str {
        "fixed_test"
    }

    async fn remaining_tokens(&self, _user_id: &str) -> Result<u64, AccountError> {
        Ok(self.remaining)
    }
}

/// Records every published `(topic, key, payload)`.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, topic: &str, message: &serde_json::Value, key: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), message.clone()));
        true
    }
}

/// Drops everything and reports failure.
pub struct DroppingPublisher;

#[async_trait]
impl EventPublisher for DroppingPublisher {
    fn name(&self) -> &str {
        "dropping"
    }

    async fn publish(&self, _topic: &str, _message: &serde_json::Value, _key: &str) -> bool {
        false
    }
}
