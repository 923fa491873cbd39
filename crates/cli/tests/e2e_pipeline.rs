//! End-to-end tests for the personachat turn pipeline.
//!
//! These build a pipeline the way the CLI does (`ChatPipeline::from_config`)
//! with scripted providers and in-memory stores, then drive whole turns.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use personachat_account::FixedAccountService;
use personachat_config::{AppConfig, MemoryKind};
use personachat_core::error::{ProviderError, RetrievalError};
use personachat_core::{
    Character, EventPublisher, HistoryRepository, KnowledgeSource, MemoryStore, Message, Provider, ProviderRequest,
    ProviderResponse, RetrievalMode, RetrievedChunk, Role, SessionKey, Usage,
};
use personachat_memory::{InMemoryHistoryRepository, InMemorySessionStore};
use personachat_pipeline::{pricing_from_config, ChatPipeline, Collaborators, TurnRequest, UsageSource};

// ── Mocks ────────────────────────────────────────────────────────────────

/// Returns scripted responses in sequence and records every prompt.
struct ScriptedProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedProvider exhausted");
        }
        responses.remove(0)
    }
}

fn reply(text: &str, usage: Option<(u32, u32)>) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        message: Message::assistant(text),
        usage: usage.map(|(p, c)| Usage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: p + c,
        }),
        model: "gpt-5".into(),
        metadata: serde_json::Map::new(),
    })
}

/// Fixed passages per retrieval mode.
struct TwoModeKnowledge {
    similarity: Vec<&'static str>,
    mmr: Vec<&'static str>,
}

#[async_trait]
impl KnowledgeSource for TwoModeKnowledge {
    fn name(&self) -> &str {
        "two_mode"
    }

    async fn search(
        &self,
        _namespace: &str,
        _query: &str,
        k: usize,
        mode: RetrievalMode,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let texts = match mode {
            RetrievalMode::Similarity => &self.similarity,
            RetrievalMode::Mmr => &self.mmr,
        };
        Ok(texts
            .iter()
            .take(k)
            .map(|t| RetrievedChunk::new(*t, Some(1), "kb"))
            .collect())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<serde_json::Value>>,
}

impl RecordingPublisher {
    fn events(&self) -> Vec<serde_json::Value> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, _topic: &str, message: &serde_json::Value, _key: &str) -> bool {
        self.events.lock().unwrap().push(message.clone());
        true
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    pipeline: ChatPipeline,
    chat: Arc<ScriptedProvider>,
    summary: Arc<ScriptedProvider>,
    store: Arc<InMemorySessionStore>,
    history: Arc<InMemoryHistoryRepository>,
    publisher: Arc<RecordingPublisher>,
}

fn hong() -> Character {
    let mut c = Character::new(1, "Hong");
    c.description = "A wandering swordsman of the Joseon era.".into();
    c
}

fn harness(
    config: AppConfig,
    chat: Vec<Result<ProviderResponse, ProviderError>>,
    summaries: Vec<Result<ProviderResponse, ProviderError>>,
    remaining: u64,
) -> Harness {
    let chat = ScriptedProvider::new(chat);
    let summary = ScriptedProvider::new(summaries);
    let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));
    let history = Arc::new(InMemoryHistoryRepository::new());
    let publisher = Arc::new(RecordingPublisher::default());

    let collaborators = Collaborators {
        knowledge: Arc::new(TwoModeKnowledge {
            similarity: vec!["A", "B"],
            mmr: vec!["B", "C"],
        }),
        store: store.clone(),
        history: history.clone(),
        account: Arc::new(FixedAccountService::new(remaining)),
        publisher: publisher.clone(),
        chat_provider: chat.clone(),
        chat_model: "gpt-5".into(),
        summary_provider: summary.clone(),
        summary_model: "gpt-3.5-turbo".into(),
        pricing: Arc::new(pricing_from_config(&config)),
    };

    Harness {
        pipeline: ChatPipeline::from_config(&config, collaborators).unwrap(),
        chat,
        summary,
        store,
        history,
        publisher,
    }
}

fn buffer_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.memory.kind = MemoryKind::Buffer;
    config
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_reported_usage_is_priced_and_published() {
    let h = harness(buffer_config(), vec![reply("Hello, traveller.", Some((120, 40)))], vec![], 5000);

    let outcome = h.pipeline.chat(TurnRequest::new(hong(), "u1", "hello")).await.unwrap();

    assert_eq!(outcome.answer, "Hello, traveller.");
    assert_eq!(outcome.usage_source, UsageSource::Reported);
    assert_eq!(outcome.usage.prompt_tokens, 120);
    assert_eq!(outcome.usage.completion_tokens, 40);
    assert_eq!(outcome.usage.total_tokens, 160);
    assert!((outcome.usage.total_cost - 0.01).abs() < 1e-9);
    assert!(outcome.event_published);

    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["success"], true);
    assert_eq!(events[0]["total_token_count"], 160);
    assert_eq!(events[0]["answer"], "Hello, traveller.");
    assert_eq!(events[0]["model_name"], "gpt-5");

    let page = h.history.find_page(outcome.session.as_str(), None, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].input_text, "hello");
}

#[tokio::test]
async fn e2e_merged_context_is_deduplicated_in_order() {
    let h = harness(buffer_config(), vec![reply("ok", Some((10, 5)))], vec![], 100_000);

    h.pipeline.chat(TurnRequest::new(hong(), "u1", "Tell me")).await.unwrap();

    let prompt = h.chat.prompt(0);
    let a = prompt.find("[p1][kb] A").unwrap();
    let b = prompt.find("[p1][kb] B").unwrap();
    let c = prompt.find("[p1][kb] C").unwrap();
    assert!(a < b && b < c);
    assert_eq!(prompt.matches("[p1][kb] B").count(), 1);
}

#[tokio::test]
async fn e2e_budget_rejection_never_calls_the_model() {
    let h = harness(buffer_config(), vec![], vec![], 10);

    let err = h.pipeline.chat(TurnRequest::new(hong(), "u1", "Hi")).await.unwrap_err();

    assert_eq!(err.kind(), "insufficient_budget");
    assert_eq!(h.chat.calls(), 0);
    assert!(h.publisher.events().is_empty());
    let session = SessionKey::derive(1, "u1");
    assert!(h.history.find_page(session.as_str(), None, 10).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn e2e_missing_usage_falls_back_to_estimate() {
    let h = harness(buffer_config(), vec![reply("A short reply.", None)], vec![], 100_000);

    let outcome = h.pipeline.chat(TurnRequest::new(hong(), "u1", "Hi")).await.unwrap();

    assert_eq!(outcome.usage_source, UsageSource::Estimated);
    assert!(outcome.usage.prompt_tokens > 0);
    assert!(outcome.usage.completion_tokens > 0);
    assert_eq!(
        outcome.usage.total_tokens,
        outcome.usage.prompt_tokens + outcome.usage.completion_tokens
    );
    assert!(outcome.usage.total_cost > 0.0);
    assert_eq!(h.publisher.events()[0]["success"], true);
}

#[tokio::test]
async fn e2e_model_failure_leaves_history_untouched() {
    let h = harness(
        buffer_config(),
        vec![
            reply("Well met.", Some((20, 5))),
            Err(ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            }),
        ],
        vec![],
        100_000,
    );
    let character = hong();
    let session = SessionKey::derive(character.id, "u1");

    h.pipeline.chat(TurnRequest::new(character.clone(), "u1", "Hello")).await.unwrap();
    let stored_before = h.store.len(&session).await.unwrap();
    assert_eq!(stored_before, 2);

    let err = h.pipeline.chat(TurnRequest::new(character.clone(), "u1", "Hi")).await.unwrap_err();
    assert_eq!(err.kind(), "model_invocation_failure");

    assert_eq!(h.store.len(&session).await.unwrap(), stored_before);
    assert_eq!(h.history.find_page(session.as_str(), None, 10).await.unwrap().items.len(), 1);
    let prepared = h.pipeline.prepare(&character, &session, "again").await.unwrap();
    assert_eq!(prepared.memory.messages.len(), 2);
    assert_eq!(prepared.memory.messages[0].content, "Hello");

    let events = h.publisher.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["success"], false);
    assert!(events[1]["answer"].is_null());
}

#[tokio::test]
async fn e2e_long_history_is_summarized_on_the_next_turn() {
    let mut config = AppConfig::default();
    config.memory.kind = MemoryKind::SummaryBuffer;
    config.memory.max_token_limit = 50;

    let long_answer = "I have walked the length of the peninsula many times, \
                       from the southern ports to the northern mountains, \
                       and every village taught me a different song."
        .repeat(2);
    let h = harness(
        config,
        vec![
            reply(&long_answer, Some((100, 60))),
            reply("Indeed.", Some((90, 5))),
            reply("Then I rested.", Some((95, 5))),
            reply("Enough stories.", Some((99, 5))),
        ],
        vec![reply("The user asked where Hong has travelled.", Some((30, 10)))],
        100_000,
    );
    let character = hong();
    let session = SessionKey::derive(character.id, "u1");

    h.pipeline
        .chat(TurnRequest::new(character.clone(), "u1", "Where have you travelled, and what did you see there?"))
        .await
        .unwrap();

    // One exchange over the limit: a summary marker, then both messages.
    let prepared = h.pipeline.prepare(&character, &session, "And then?").await.unwrap();
    assert!(prepared.memory.summarized);
    assert_eq!(prepared.memory.messages[0].role, Role::System);
    assert_eq!(prepared.memory.messages.len(), 3);
    assert_eq!(prepared.memory.messages[1].role, Role::User);

    let outcome = h.pipeline.chat(TurnRequest::new(character.clone(), "u1", "And then?")).await.unwrap();
    assert!(outcome.memory_summarized);
    assert_eq!(outcome.estimate, prepared.estimate);
    assert_eq!(h.summary.calls(), 0);

    h.pipeline.chat(TurnRequest::new(character.clone(), "u1", "And after?")).await.unwrap();
    assert_eq!(h.summary.calls(), 0);

    // Six stored messages: the oldest two are summarized, the last four kept.
    let prepared = h.pipeline.prepare(&character, &session, "Go on").await.unwrap();
    assert_eq!(prepared.memory.messages.len(), 5);
    assert_eq!(prepared.memory.messages[0].role, Role::System);
    assert_eq!(prepared.memory.messages[1].content, "And then?");
    let outcome = h.pipeline.chat(TurnRequest::new(character, "u1", "Go on")).await.unwrap();
    assert!(outcome.memory_summarized);
    assert_eq!(h.summary.calls(), 1);
    assert!(h.chat.prompt(3).contains("The user asked where Hong has travelled."));
}

#[tokio::test]
async fn e2e_estimate_is_idempotent() {
    let h = harness(buffer_config(), vec![], vec![], 100_000);
    let request = TurnRequest::new(hong(), "u1", "How far is Hanyang?");

    let first = h.pipeline.estimate(&request).await.unwrap();
    let second = h.pipeline.estimate(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total, first.corrected_prompt_tokens + first.completion_estimate);
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn e2e_unmetered_turn_skips_gate_and_event() {
    let h = harness(buffer_config(), vec![reply("ok", Some((10, 5)))], vec![], 0);

    let outcome = h
        .pipeline
        .chat(TurnRequest::new(hong(), "operator", "test").unmetered())
        .await
        .unwrap();

    assert!(!outcome.event_published);
    assert!(h.publisher.events().is_empty());
    let page = h.history.find_page(outcome.session.as_str(), None, 10).await.unwrap();
    assert_eq!(page.items.len(), 1);
}
