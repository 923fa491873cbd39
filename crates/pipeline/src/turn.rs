//! Chat turn orchestration.
//!
//! One metered turn runs these stages in order:
//!
//! 1. Take the session lock (when sessions are serialized)
//! 2. Retrieve context (both retrievers concurrently) and load the memory view
//! 3. Render the prompt and estimate its cost
//! 4. Budget gate: reject before any billable call if the estimate exceeds the balance
//! 5. Invoke the model, collecting usage (estimated when the provider reports none)
//! 6. Publish the turn event, then persist the exchange
//!
//! A failed model call publishes a failure event and persists nothing. An
//! unmetered turn skips stages 4 and the event in 6.

use std::sync::Arc;

use personachat_core::character::Character;
use personachat_core::error::{Error, Result};
use personachat_core::history::{HistoryPage, HistoryRepository};
use personachat_core::retrieval::{KnowledgeSource, ScopedRetriever};
use personachat_core::session::SessionKey;
use personachat_core::usage::{TokenEstimate, UsageRecord};
use tracing::{error, info};

use crate::accountant::{TurnContext, UsageAccountant};
use crate::budget::{BudgetGate, TokenEstimator};
use crate::context::{format_style_exemplars, PromptAssembler, PromptParts, RetrievalMerger};
use crate::invoker::{ModelInvoker, UsageSource};
use crate::locks::SessionLocks;
use crate::memory::{ConversationMemory, MemoryView};

// ── Types ─────────────────────────────────────────────────────────────────

/// One user message addressed to one character.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub character: Character,
    pub user_id: String,
    pub session: SessionKey,
    pub input: String,
    /// Metered turns are budget-gated and reported as events.
    pub metered: bool,
}

impl TurnRequest {
    /// A metered turn in the canonical session for this user and character.
    pub fn new(character: Character, user_id: impl Into<String>, input: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            session: SessionKey::derive(character.id, &user_id),
            character,
            user_id,
            input: input.into(),
            metered: true,
        }
    }

    pub fn with_session(mut self, session: SessionKey) -> Self {
        self.session = session;
        self
    }

    /// Operator test chat: no budget gate, no turn event.
    pub fn unmetered(mut self) -> Self {
        self.metered = false;
        self
    }
}

/// A rendered prompt and its predicted cost.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub prompt: String,
    pub estimate: TokenEstimate,
    pub memory: MemoryView,
    pub context_chunks: usize,
}

/// The result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    pub usage: UsageRecord,
    pub usage_source: UsageSource,
    pub estimate: TokenEstimate,
    pub session: SessionKey,
    pub response_time_ms: u64,
    pub event_published: bool,
    pub memory_summarized: bool,
}

/// What a history clear removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCleared {
    pub memory_cleared: bool,
    pub audit_records_deleted: u64,
}

/// Collaborators and settings a pipeline is assembled from.
pub struct PipelineParts {
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub memory: Arc<dyn ConversationMemory>,
    pub history: Arc<dyn HistoryRepository>,
    pub account: Arc<dyn personachat_core::AccountService>,
    pub publisher: Arc<dyn personachat_core::EventPublisher>,
    pub invoker: ModelInvoker,
    pub estimator: TokenEstimator,
    pub merger: RetrievalMerger,
    pub assembler: PromptAssembler,
    pub event_topic: String,
    pub serialize_sessions: bool,
}

// ── Pipeline ──────────────────────────────────────────────────────────────

pub struct ChatPipeline {
    knowledge: Arc<dyn KnowledgeSource>,
    memory: Arc<dyn ConversationMemory>,
    history: Arc<dyn HistoryRepository>,
    merger: RetrievalMerger,
    assembler: PromptAssembler,
    estimator: TokenEstimator,
    gate: BudgetGate,
    invoker: ModelInvoker,
    accountant: UsageAccountant,
    locks: Option<SessionLocks>,
}

impl ChatPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        let accountant = UsageAccountant::new(parts.memory.clone(), parts.history.clone(), parts.publisher)
            .with_topic(parts.event_topic);
        Self {
            knowledge: parts.knowledge,
            memory: parts.memory,
            history: parts.history,
            merger: parts.merger,
            assembler: parts.assembler,
            estimator: parts.estimator,
            gate: BudgetGate::new(parts.account),
            invoker: parts.invoker,
            accountant,
            locks: parts.serialize_sessions.then(SessionLocks::new),
        }
    }

    pub fn model(&self) -> &str {
        self.invoker.model()
    }

    pub fn memory_backend(&self) -> &str {
        self.memory.name()
    }

    /// Retrieve, load memory, render and estimate, without calling the model.
    pub async fn prepare(&self, character: &Character, session: &SessionKey, input: &str) -> Result<PreparedTurn> {
        character.validate()?;
        let (similarity, mmr) = ScopedRetriever::pair(self.knowledge.clone(), &character.namespace());

        let (chunks, memory) = tokio::try_join!(
            async { self.merger.retrieve(&similarity, &mmr, input).await.map_err(Error::from) },
            async { self.memory.load(session).await.map_err(Error::from) },
        )?;

        let context = crate::context::render_context(&chunks, self.merger.chunk_char_cap());
        let labels = self.assembler.labels();
        let style_examples = format_style_exemplars(&character.style_exemplars, labels);
        let chat_history = memory.render(labels);

        let prompt = self.assembler.render(&PromptParts {
            character_name: &character.name,
            description: &character.description,
            context: &context,
            style_examples: &style_examples,
            chat_history: &chat_history,
            input,
        });
        let estimate = self.estimator.estimate(&prompt);

        Ok(PreparedTurn {
            prompt,
            estimate,
            memory,
            context_chunks: chunks.len(),
        })
    }

    /// Predict a turn's cost. Calling twice with no history change gives the same estimate.
    pub async fn estimate(&self, request: &TurnRequest) -> Result<TokenEstimate> {
        Ok(self
            .prepare(&request.character, &request.session, &request.input)
            .await?
            .estimate)
    }

    /// Run one turn.
    pub async fn chat(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(&request.session).await),
            None => None,
        };
        info!(
            session = %request.session,
            chatbot_id = request.character.id,
            metered = request.metered,
            "Turn started"
        );

        let prepared = self
            .prepare(&request.character, &request.session, &request.input)
            .await?;

        if request.metered {
            self.gate.check(&request.user_id, &prepared.estimate).await?;
        }

        let ctx = TurnContext {
            chatbot_id: request.character.id,
            user_id: &request.user_id,
            session: &request.session,
            input: &request.input,
            model_name: self.invoker.model(),
        };

        let invocation = match self.invoker.invoke(&prepared.prompt, &self.estimator).await {
            Ok(invocation) => invocation,
            Err(failure) => {
                error!(session = %request.session, error = %failure.error, "Model call failed");
                if request.metered {
                    self.accountant.record_failure(ctx, &failure).await;
                }
                return Err(Error::Provider(failure.error));
            }
        };

        let event_published = self
            .accountant
            .record_success(ctx, &invocation, request.metered)
            .await?;

        info!(
            session = %request.session,
            estimated = prepared.estimate.total,
            prompt_tokens = invocation.usage.prompt_tokens,
            completion_tokens = invocation.usage.completion_tokens,
            total_cost = invocation.usage.total_cost,
            "Turn finished"
        );

        Ok(TurnOutcome {
            response_time_ms: invocation.elapsed.as_millis() as u64,
            answer: invocation.answer,
            usage: invocation.usage,
            usage_source: invocation.usage_source,
            estimate: prepared.estimate,
            session: request.session,
            event_published,
            memory_summarized: prepared.memory.summarized,
        })
    }

    /// Newest-first page of the session's audit history.
    pub async fn history_page(&self, session: &SessionKey, cursor: Option<i64>, size: usize) -> Result<HistoryPage> {
        Ok(self.history.find_page(session.as_str(), cursor, size).await?)
    }

    /// Forget a session: its memory and its audit records.
    pub async fn clear_history(&self, session: &SessionKey) -> Result<HistoryCleared> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(session).await),
            None => None,
        };
        let memory_cleared = self.memory.clear(session).await?;
        let audit_records_deleted = self.history.delete_by_session(session.as_str()).await?;
        info!(%session, memory_cleared, audit_records_deleted, "History cleared");
        Ok(HistoryCleared {
            memory_cleared,
            audit_records_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CharHeuristicCounter;
    use crate::memory::BufferMemory;
    use crate::test_helpers::{
        make_text_response, FailingProvider, FixedAccount, ModeKnowledge, RecordingPublisher, SequentialMockProvider,
    };
    use personachat_core::{Locale, MemoryStore, Provider, StyleExemplar};
    use personachat_memory::{InMemoryHistoryRepository, InMemorySessionStore};
    use personachat_telemetry::PricingTable;

    struct Harness {
        pipeline: ChatPipeline,
        provider: Arc<SequentialMockProvider>,
        publisher: Arc<RecordingPublisher>,
    }

    fn harness(responses: Vec<personachat_core::ProviderResponse>, remaining: u64) -> Harness {
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = build(provider.clone(), publisher.clone(), remaining);
        Harness {
            pipeline,
            provider,
            publisher,
        }
    }

    fn build(provider: Arc<dyn Provider>, publisher: Arc<RecordingPublisher>, remaining: u64) -> ChatPipeline {
        build_with_store(provider, publisher, remaining, Arc::new(InMemorySessionStore::default()))
    }

    fn build_with_store(
        provider: Arc<dyn Provider>,
        publisher: Arc<RecordingPublisher>,
        remaining: u64,
        store: Arc<InMemorySessionStore>,
    ) -> ChatPipeline {
        ChatPipeline::new(PipelineParts {
            knowledge: Arc::new(ModeKnowledge::new(&["A", "B"], &["B", "C"])),
            memory: Arc::new(BufferMemory::new(store)),
            history: Arc::new(InMemoryHistoryRepository::new()),
            account: Arc::new(FixedAccount::new(remaining)),
            publisher,
            invoker: ModelInvoker::new(provider, "gpt-5", Arc::new(PricingTable::with_defaults())),
            estimator: TokenEstimator::new(Arc::new(CharHeuristicCounter), 0.85, 500),
            merger: RetrievalMerger::default(),
            assembler: PromptAssembler::new(Locale::En),
            event_topic: "chatbot-chat-request".into(),
            serialize_sessions: true,
        })
    }

    fn hong() -> Character {
        let mut c = Character::new(1, "Hong");
        c.add_exemplar(StyleExemplar::new("who are you?", "Hong. Enough.")).unwrap();
        c
    }

    #[tokio::test]
    async fn prompt_contains_merged_context_style_and_input() {
        let h = harness(vec![], 5000);
        let s = SessionKey::derive(1, "u");
        let prepared = h.pipeline.prepare(&hong(), &s, "hello").await.unwrap();

        assert_eq!(prepared.context_chunks, 3);
        assert!(prepared.prompt.contains("] A\n[p1][kb] B\n[p1][kb] C"));
        assert!(prepared.prompt.contains("user: who are you?\nassistant: Hong. Enough."));
        assert!(prepared.prompt.ends_with("user: hello\n\nHong's answer:"));
        assert!(prepared.estimate.total > 500);
    }

    #[tokio::test]
    async fn metered_turn_end_to_end() {
        let h = harness(vec![make_text_response("Hmph.")], 5000);
        let outcome = h.pipeline.chat(TurnRequest::new(hong(), "u", "hello")).await.unwrap();

        assert_eq!(outcome.answer, "Hmph.");
        assert_eq!(outcome.usage_source, UsageSource::Reported);
        assert_eq!(outcome.usage.total_tokens, 15);
        assert!(outcome.event_published);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.publisher.events().len(), 1);

        let page = h.pipeline.history_page(&outcome.session, None, 10).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn over_budget_turn_never_calls_the_model() {
        let h = harness(vec![make_text_response("unused")], 10);
        let err = h.pipeline.chat(TurnRequest::new(hong(), "u", "hello")).await.unwrap_err();

        assert!(matches!(err, Error::InsufficientBudget { remaining: 10, .. }));
        assert_eq!(h.provider.call_count(), 0);
        assert!(h.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn unmetered_turn_skips_gate_and_event() {
        let h = harness(vec![make_text_response("fine.")], 0);
        let outcome = h
            .pipeline
            .chat(TurnRequest::new(hong(), "operator", "test").unmetered())
            .await
            .unwrap();

        assert_eq!(outcome.answer, "fine.");
        assert!(!outcome.event_published);
        assert!(h.publisher.events().is_empty());
        assert_eq!(h.pipeline.history_page(&outcome.session, None, 10).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn failed_model_call_emits_failure_and_keeps_history() {
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = build(Arc::new(FailingProvider::new("boom")), publisher.clone(), 5000);
        let request = TurnRequest::new(hong(), "u", "hello");
        let session = request.session.clone();

        let err = pipeline.chat(request).await.unwrap_err();
        assert_eq!(err.kind(), "model_invocation_failure");

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].2["success"], false);
        assert!(pipeline.prepare(&hong(), &session, "x").await.unwrap().memory.is_empty());
    }

    #[tokio::test]
    async fn failed_model_call_leaves_existing_history_count_unchanged() {
        let store = Arc::new(InMemorySessionStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let pipeline = build_with_store(Arc::new(FailingProvider::new("boom")), publisher, 5000, store.clone());
        let request = TurnRequest::new(hong(), "u", "hello");
        let session = request.session.clone();
        store.append_exchange(&session, "earlier", "reply").await.unwrap();

        assert!(pipeline.chat(request).await.is_err());

        assert_eq!(pipeline.memory.message_count(&session).await.unwrap(), 2);
        assert_eq!(store.read(&session).await.unwrap()[0].content, "earlier");
        assert!(pipeline.history_page(&session, None, 10).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn estimate_is_idempotent() {
        let h = harness(vec![], 5000);
        let request = TurnRequest::new(hong(), "u", "hello");
        let a = h.pipeline.estimate(&request).await.unwrap();
        let b = h.pipeline.estimate(&request).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn second_turn_sees_first_in_history() {
        let h = harness(vec![make_text_response("first"), make_text_response("second")], 5000);
        h.pipeline.chat(TurnRequest::new(hong(), "u", "one")).await.unwrap();
        h.pipeline.chat(TurnRequest::new(hong(), "u", "two")).await.unwrap();

        let prompt = &h.provider.requests()[1].messages[0].content;
        assert!(prompt.contains("[Earlier conversation]\nuser: one\nassistant: first"));
    }

    #[tokio::test]
    async fn invalid_character_is_rejected_before_retrieval() {
        let h = harness(vec![], 5000);
        let mut c = Character::new(9, "Crowded");
        c.style_exemplars = (0..6).map(|i| StyleExemplar::new(i.to_string(), "x")).collect();
        let err = h.pipeline.chat(TurnRequest::new(c, "u", "hi")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn clear_history_removes_memory_and_audit() {
        let h = harness(vec![make_text_response("a"), make_text_response("b")], 5000);
        h.pipeline.chat(TurnRequest::new(hong(), "u", "one")).await.unwrap();
        let outcome = h.pipeline.chat(TurnRequest::new(hong(), "u", "two")).await.unwrap();

        let cleared = h.pipeline.clear_history(&outcome.session).await.unwrap();
        assert_eq!(
            cleared,
            HistoryCleared {
                memory_cleared: true,
                audit_records_deleted: 2
            }
        );
        assert!(h.pipeline.history_page(&outcome.session, None, 10).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_do_not_interleave() {
        let h = harness(vec![make_text_response("a"), make_text_response("b")], 5000);
        let pipeline = Arc::new(h.pipeline);
        let (r1, r2) = tokio::join!(
            pipeline.chat(TurnRequest::new(hong(), "u", "one")),
            pipeline.chat(TurnRequest::new(hong(), "u", "two")),
        );
        r1.unwrap();
        r2.unwrap();

        // Whichever ran second saw the first exchange in its prompt.
        let second_prompt = &h.provider.requests()[1].messages[0].content;
        assert!(second_prompt.contains("[Earlier conversation]\nuser: "));
    }
}
