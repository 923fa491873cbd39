//! Usage collection for model calls.
//!
//! Providers report token usage in different places and shapes. A
//! [`UsageCollector`] is attached to each call as a [`UsageHook`]; when the
//! call returns it walks [`UsageShape::ORDER`] and keeps the first shape
//! that yields a non-zero total. When none does, the caller supplies an
//! estimate through [`UsageCollector::record_fallback`].

use std::sync::{Arc, Mutex};

use personachat_core::error::ProviderError;
use personachat_core::{ProviderResponse, Usage, UsageRecord};
use serde_json::Value;
use tracing::debug;

use crate::pricing::{round_cost, PricingTable};

/// Observer attached to a single model call.
pub trait UsageHook: Send + Sync {
    fn on_start(&self, model: &str);
    fn on_end(&self, response: &ProviderResponse);
    fn on_error(&self, error: &ProviderError);
}

/// Known locations of provider usage data, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    /// `ProviderResponse::usage` as mapped by the adapter.
    Typed,
    /// `metadata.token_usage.{prompt_tokens, completion_tokens, total_tokens}`
    TokenUsage,
    /// `metadata.usage.{input_tokens, output_tokens}` (Anthropic)
    InputOutput,
    /// `metadata.usage_metadata` (Gemini counts or input/output counts)
    UsageMetadata,
    /// `metadata.generation_info.token_usage`
    GenerationInfo,
}

impl UsageShape {
    pub const ORDER: [UsageShape; 5] = [
        UsageShape::Typed,
        UsageShape::TokenUsage,
        UsageShape::InputOutput,
        UsageShape::UsageMetadata,
        UsageShape::GenerationInfo,
    ];

    /// Try this shape against a response.
    pub fn extract(&self, response: &ProviderResponse) -> Option<Usage> {
        let meta = &response.metadata;
        let usage = match self {
            UsageShape::Typed => response.usage,
            UsageShape::TokenUsage => meta.get("token_usage").and_then(openai_counts),
            UsageShape::InputOutput => meta.get("usage").and_then(|u| {
                input_output_counts(u).or_else(|| openai_counts(u))
            }),
            UsageShape::UsageMetadata => meta.get("usage_metadata").and_then(|u| {
                gemini_counts(u).or_else(|| input_output_counts(u))
            }),
            UsageShape::GenerationInfo => meta
                .get("generation_info")
                .and_then(|g| g.get("token_usage"))
                .and_then(openai_counts),
        };
        usage.filter(|u| u.total_tokens > 0)
    }
}

/// First non-empty usage found in `response`, with the shape it came from.
pub fn extract_usage(response: &ProviderResponse) -> Option<(UsageShape, Usage)> {
    UsageShape::ORDER
        .iter()
        .find_map(|shape| shape.extract(response).map(|u| (*shape, u)))
}

fn field(v: &Value, key: &str) -> Option<u32> {
    v.get(key).and_then(Value::as_u64).map(|n| n as u32)
}

fn build(prompt: Option<u32>, completion: Option<u32>, total: Option<u32>) -> Option<Usage> {
    if prompt.is_none() && completion.is_none() && total.is_none() {
        return None;
    }
    let prompt_tokens = prompt.unwrap_or(0);
    let completion_tokens = completion.unwrap_or(0);
    Some(Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: total.unwrap_or(prompt_tokens + completion_tokens),
    })
}

fn openai_counts(v: &Value) -> Option<Usage> {
    build(
        field(v, "prompt_tokens"),
        field(v, "completion_tokens"),
        field(v, "total_tokens"),
    )
}

fn input_output_counts(v: &Value) -> Option<Usage> {
    build(
        field(v, "input_tokens"),
        field(v, "output_tokens"),
        field(v, "total_tokens"),
    )
}

fn gemini_counts(v: &Value) -> Option<Usage> {
    build(
        field(v, "prompt_token_count"),
        field(v, "candidates_token_count"),
        field(v, "total_token_count"),
    )
}

#[derive(Debug, Default)]
struct CollectorState {
    model: String,
    record: UsageRecord,
    last_error: Option<String>,
}

/// Accumulates a [`UsageRecord`] for one turn.
pub struct UsageCollector {
    pricing: Arc<PricingTable>,
    state: Mutex<CollectorState>,
}

impl UsageCollector {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self {
            pricing,
            state: Mutex::new(CollectorState::default()),
        }
    }

    /// Current totals.
    pub fn snapshot(&self) -> UsageRecord {
        self.lock().record
    }

    /// Message of the last failed call, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Record usage for the model named in the last `on_start`.
    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64) {
        let mut state = self.lock();
        let cost = self
            .pricing
            .compute_cost(&state.model, prompt_tokens, completion_tokens);
        let record = &mut state.record;
        record.prompt_tokens += prompt_tokens;
        record.completion_tokens += completion_tokens;
        record.total_tokens += prompt_tokens + completion_tokens;
        record.total_cost = round_cost(record.total_cost + cost);
    }

    /// Fill in estimated usage when the provider reported none.
    ///
    /// No-op if real usage was already recorded.
    pub fn record_fallback(&self, prompt_tokens: u64, completion_tokens: u64) {
        if !self.snapshot().is_empty() {
            return;
        }
        self.record(prompt_tokens, completion_tokens);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UsageHook for UsageCollector {
    fn on_start(&self, model: &str) {
        let mut state = self.lock();
        *state = CollectorState {
            model: model.to_string(),
            ..CollectorState::default()
        };
    }

    fn on_end(&self, response: &ProviderResponse) {
        {
            let mut state = self.lock();
            state.record.successful_requests += 1;
            // Prefer the served model name when it has a price.
            if self.pricing.resolve(&response.model).is_some() {
                state.model = response.model.clone();
            }
        }

        match extract_usage(response) {
            Some((shape, usage)) => {
                debug!(
                    ?shape,
                    prompt = usage.prompt_tokens,
                    completion = usage.completion_tokens,
                    "Usage extracted"
                );
                self.record(usage.prompt_tokens as u64, usage.completion_tokens as u64);
                // Some providers report a total that is not the plain sum.
                let mut state = self.lock();
                let extra = (usage.total_tokens as u64)
                    .saturating_sub(usage.prompt_tokens as u64 + usage.completion_tokens as u64);
                state.record.total_tokens += extra;
            }
            None => debug!("No usage data in provider response"),
        }
    }

    fn on_error(&self, error: &ProviderError) {
        self.lock().last_error = Some(error.to_string());
    }
}
