//! Token-triggered summary buffer.
//!
//! While the stored history's estimated size (total characters / 4) stays
//! within `max_token_limit`, the view is the verbatim history. Past the
//! limit, everything except the most recent `recent_k` messages is
//! summarized by one auxiliary model call and the view becomes:
//!
//! ```text
//! [system: <summary prefix><summary>] + last recent_k messages
//! ```
//!
//! A summarization failure or timeout never fails the turn: the view
//! degrades to the verbatim history with the oldest messages dropped
//! until it fits, always keeping the most recent `recent_k`.
//!
//! Summaries are cached per session, keyed by a fingerprint of the
//! summarized prefix, so an estimate and the turn that follows it see the
//! same text without paying for a second summary call.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use personachat_core::error::{MemoryError, ProviderError};
use personachat_core::locale::Locale;
use personachat_core::memory::MemoryStore;
use personachat_core::message::{estimate_history_tokens, Message};
use personachat_core::provider::{Provider, ProviderRequest};
use personachat_core::session::SessionKey;
use tracing::{debug, warn};

use super::{format_history, ConversationMemory, MemoryView};
use crate::context::ExchangeLabels;

/// Cached summaries are dropped wholesale past this many sessions.
const MAX_CACHED_SUMMARIES: usize = 10_000;

// ── Summarizer ────────────────────────────────────────────────────────────

/// Produces a short abbreviation of a message prefix.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError>;
}

/// Summarizes with one completion call to a (usually cheaper) model.
pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    locale: Locale,
    labels: ExchangeLabels,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, locale: Locale) -> Self {
        Self {
            provider,
            model: model.into(),
            locale,
            labels: ExchangeLabels::for_locale(locale),
        }
    }

    pub fn with_labels(mut self, labels: ExchangeLabels) -> Self {
        self.labels = labels;
        self
    }

    fn prompt(&self, messages: &[Message]) -> String {
        let transcript = format_history(messages, &self.labels);
        match self.locale {
            Locale::En => format!(
                "Concisely summarize the following conversation. \
                 Keep names, facts and anything either side promised.\n\n\
                 {transcript}\n\nSummary:"
            ),
            Locale::Ko => format!(
                "다음 대화를 간결하게 요약해 줘. \
                 이름, 사실, 서로 약속한 내용은 빠뜨리지 마.\n\n\
                 {transcript}\n\n요약:"
            ),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let request = ProviderRequest::from_prompt(&self.model, self.prompt(messages), 0.0);
        let response = self.provider.complete(request).await?;
        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(ProviderError::InvalidResponse("empty summary".into()));
        }
        debug!(
            model = %self.model,
            tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0),
            "Summarized conversation prefix"
        );
        Ok(summary)
    }
}

// ── Memory ────────────────────────────────────────────────────────────────

struct CachedSummary {
    fingerprint: u64,
    text: String,
}

/// Summary buffer over a [`MemoryStore`].
pub struct SummaryBufferMemory {
    store: Arc<dyn MemoryStore>,
    summarizer: Arc<dyn Summarizer>,
    max_token_limit: usize,
    recent_k: usize,
    summary_timeout: Duration,
    locale: Locale,
    cache: Mutex<HashMap<SessionKey, CachedSummary>>,
}

impl SummaryBufferMemory {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        summarizer: Arc<dyn Summarizer>,
        max_token_limit: usize,
    ) -> Self {
        Self {
            store,
            summarizer,
            max_token_limit,
            recent_k: 4,
            summary_timeout: Duration::from_secs(20),
            locale: Locale::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_recent_k(mut self, recent_k: usize) -> Self {
        self.recent_k = recent_k.max(1);
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn max_token_limit(&self) -> usize {
        self.max_token_limit
    }

    async fn summary_for(&self, session: &SessionKey, older: &[Message]) -> Result<String, String> {
        let fingerprint = fingerprint(older);
        if let Some(hit) = self
            .lock_cache()
            .get(session)
            .filter(|c| c.fingerprint == fingerprint)
        {
            return Ok(hit.text.clone());
        }

        let text = match tokio::time::timeout(self.summary_timeout, self.summarizer.summarize(older)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(format!(
                    "summary timed out after {}s",
                    self.summary_timeout.as_secs()
                ));
            }
        };

        let mut cache = self.lock_cache();
        if cache.len() >= MAX_CACHED_SUMMARIES {
            cache.clear();
        }
        cache.insert(
            session.clone(),
            CachedSummary {
                fingerprint,
                text: text.clone(),
            },
        );
        Ok(text)
    }

    /// Drop oldest messages until the rest fits, keeping at least `recent_k`.
    fn truncated(&self, mut messages: Vec<Message>) -> MemoryView {
        let mut dropped = 0;
        while messages.len() > self.recent_k && estimate_history_tokens(&messages) > self.max_token_limit {
            messages.remove(0);
            dropped += 1;
        }
        MemoryView {
            messages,
            summarized: false,
            truncated: dropped > 0,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, CachedSummary>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn fingerprint(messages: &[Message]) -> u64 {
    let mut hasher = DefaultHasher::new();
    messages.len().hash(&mut hasher);
    for m in messages {
        m.role.as_str().hash(&mut hasher);
        m.content.hash(&mut hasher);
    }
    hasher.finish()
}

#[async_trait]
impl ConversationMemory for SummaryBufferMemory {
    fn name(&self) -> &str {
        "summary_buffer"
    }

    async fn load(&self, session: &SessionKey) -> Result<MemoryView, MemoryError> {
        let messages = self.store.read(session).await?;
        let estimated = estimate_history_tokens(&messages);
        if estimated <= self.max_token_limit {
            return Ok(MemoryView::verbatim(messages));
        }

        let split = messages.len().saturating_sub(self.recent_k);
        let summary = if split == 0 {
            Ok(String::new())
        } else {
            self.summary_for(session, &messages[..split]).await
        };
        match summary {
            Ok(summary) => {
                debug!(%session, summarized = split, estimated, "Using summarized memory view");
                let mut view = Vec::with_capacity(messages.len() - split + 1);
                view.push(Message::system(
                    format!("{}{summary}", self.locale.summary_prefix()).trim_end(),
                ));
                view.extend_from_slice(&messages[split..]);
                Ok(MemoryView {
                    messages: view,
                    summarized: true,
                    truncated: false,
                })
            }
            Err(reason) => {
                warn!(%session, %reason, "Summarization failed, falling back to truncated history");
                Ok(self.truncated(messages))
            }
        }
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
        self.lock_cache().remove(session);
        self.store.delete(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_text_response, FailingProvider, SequentialMockProvider};
    use personachat_core::Role;
    use personachat_memory::InMemorySessionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} earlier messages", messages.len()))
        }
    }

    struct StuckSummarizer;

    #[async_trait]
    impl Summarizer for StuckSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }
    }

    async fn filled_store(exchanges: usize) -> Arc<InMemorySessionStore> {
        let store = Arc::new(InMemorySessionStore::default());
        let s = session();
        for i in 0..exchanges {
            store
                .append_exchange(&s, &format!("question number {i} {}", "x".repeat(40)), &format!("answer {i} {}", "y".repeat(40)))
                .await
                .unwrap();
        }
        store
    }

    fn session() -> SessionKey {
        SessionKey::derive(1, "alice")
    }

    #[tokio::test]
    async fn under_limit_is_verbatim() {
        let store = filled_store(1).await;
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store, summarizer.clone(), 500);

        let view = memory.load(&session()).await.unwrap();
        assert_eq!(view.messages.len(), 2);
        assert!(!view.summarized);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn over_limit_is_one_summary_plus_recent_four() {
        let store = filled_store(5).await;
        let all = store.read(&session()).await.unwrap();
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store, summarizer, 50);

        let view = memory.load(&session()).await.unwrap();
        assert!(view.summarized);
        assert_eq!(view.messages.len(), 5);
        assert_eq!(view.messages[0].role, Role::System);
        assert_eq!(
            view.messages[0].content,
            "Summary of earlier conversation: 6 earlier messages"
        );
        assert_eq!(
            view.messages[1..].iter().map(|m| &m.content).collect::<Vec<_>>(),
            all[6..].iter().map(|m| &m.content).collect::<Vec<_>>()
        );
        assert_eq!(
            view.messages.iter().filter(|m| m.role == Role::System).count(),
            1
        );
    }

    #[tokio::test]
    async fn over_limit_with_short_history_still_leads_with_summary() {
        let store = Arc::new(InMemorySessionStore::default());
        store
            .append_exchange(&session(), &"q".repeat(150), &"a".repeat(150))
            .await
            .unwrap();
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store, summarizer.clone(), 50);

        let view = memory.load(&session()).await.unwrap();
        assert!(view.summarized);
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[0].role, Role::System);
        assert_eq!(view.messages[0].content, "Summary of earlier conversation:");
        assert_eq!(view.messages[1].role, Role::User);
        assert_eq!(view.messages[2].role, Role::Assistant);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_is_not_rewritten() {
        let store = filled_store(5).await;
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store.clone(), summarizer, 50);

        memory.load(&session()).await.unwrap();
        assert_eq!(store.len(&session()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn unchanged_prefix_reuses_cached_summary() {
        let store = filled_store(5).await;
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store, summarizer.clone(), 50);

        let first = memory.load(&session()).await.unwrap();
        let second = memory.load(&session()).await.unwrap();
        assert_eq!(first.messages[0].content, second.messages[0].content);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

        memory.save_exchange(&session(), "more", "sure").await.unwrap();
        memory.load(&session()).await.unwrap();
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_summarizer_degrades_to_truncated_view() {
        let store = filled_store(5).await;
        let summarizer = Arc::new(LlmSummarizer::new(
            Arc::new(FailingProvider::new("provider down")),
            "gpt-3.5-turbo",
            Locale::En,
        ));
        let memory = SummaryBufferMemory::new(store, summarizer, 50);

        let view = memory.load(&session()).await.unwrap();
        assert!(!view.summarized);
        assert!(view.truncated);
        assert_eq!(view.messages.len(), 4);
        assert!(view.messages.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test(start_paused = true)]
    async fn summary_timeout_does_not_fail_the_load() {
        let store = filled_store(5).await;
        let memory = SummaryBufferMemory::new(store, Arc::new(StuckSummarizer), 50)
            .with_summary_timeout(Duration::from_secs(1));

        let view = memory.load(&session()).await.unwrap();
        assert!(!view.summarized);
        assert_eq!(view.messages.len(), 4);
    }

    #[tokio::test]
    async fn llm_summarizer_uses_locale_prefix() {
        let store = filled_store(5).await;
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("  둘이 인사함  ")]));
        let summarizer = Arc::new(LlmSummarizer::new(provider.clone(), "gpt-3.5-turbo", Locale::Ko));
        let memory = SummaryBufferMemory::new(store, summarizer, 50).with_locale(Locale::Ko);

        let view = memory.load(&session()).await.unwrap();
        assert_eq!(view.messages[0].content, "이전 대화 요약: 둘이 인사함");
        assert_eq!(provider.call_count(), 1);
        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert!(request.messages[0].content.starts_with("다음 대화를 간결하게 요약해 줘."));
        assert!(request.messages[0].content.contains("사용자: question number 0"));
    }

    #[tokio::test]
    async fn clear_drops_store_and_cache() {
        let store = filled_store(5).await;
        let summarizer = Arc::new(CountingSummarizer { calls: AtomicUsize::new(0) });
        let memory = SummaryBufferMemory::new(store, summarizer, 50);

        memory.load(&session()).await.unwrap();
        assert!(memory.clear(&session()).await.unwrap());
        assert!(memory.load(&session()).await.unwrap().is_empty());
        assert!(memory.lock_cache().is_empty());
    }
}
