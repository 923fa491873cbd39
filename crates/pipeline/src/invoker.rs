//! Model invocation with usage collection.
//!
//! Every call carries a fresh [`UsageCollector`]. When the provider
//! reports no usable token counts, usage is reconstructed from the
//! prompt estimate and the answer's own token count, so a produced reply
//! never goes unbilled.

use std::sync::Arc;
use std::time::Duration;

use personachat_core::error::ProviderError;
use personachat_core::provider::{Provider, ProviderRequest, ProviderResponse};
use personachat_core::usage::UsageRecord;
use personachat_telemetry::{PricingTable, UsageCollector, UsageHook};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::budget::TokenEstimator;

/// Where a turn's usage numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// Reported by the provider.
    Reported,
    /// Reconstructed from token estimates.
    Estimated,
}

/// A successful model call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub answer: String,
    pub usage: UsageRecord,
    pub usage_source: UsageSource,
    pub elapsed: Duration,
}

/// A failed model call, with whatever usage was recorded before it failed.
#[derive(Debug, Clone)]
pub struct InvocationFailure {
    pub error: ProviderError,
    pub usage: UsageRecord,
    pub elapsed: Duration,
}

/// Calls one model on one provider.
pub struct ModelInvoker {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    timeout: Duration,
    pricing: Arc<PricingTable>,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, pricing: Arc<PricingTable>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(120),
            pricing,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send `prompt` once, reporting start, end or error to `hook`.
    pub async fn call(&self, prompt: &str, hook: &dyn UsageHook) -> Result<ProviderResponse, ProviderError> {
        hook.on_start(&self.model);
        let request = ProviderRequest::from_prompt(&self.model, prompt, self.temperature);

        let result = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "{} did not answer within {}s",
                self.model,
                self.timeout.as_secs()
            ))),
        };

        match &result {
            Ok(response) => hook.on_end(response),
            Err(e) => hook.on_error(e),
        }
        result
    }

    /// Send `prompt` and settle the turn's usage.
    pub async fn invoke(
        &self,
        prompt: &str,
        estimator: &TokenEstimator,
    ) -> Result<Invocation, InvocationFailure> {
        let collector = UsageCollector::new(self.pricing.clone());
        let started = Instant::now();

        let response = match self.call(prompt, &collector).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    provider = self.provider_name(),
                    model = %self.model,
                    error = %collector.last_error().unwrap_or_default(),
                    "Model call failed"
                );
                return Err(InvocationFailure {
                    error,
                    usage: collector.snapshot(),
                    elapsed: started.elapsed(),
                });
            }
        };
        let elapsed = started.elapsed();
        let answer = response.message.content;

        let usage_source = if collector.snapshot().is_empty() {
            let estimate = estimator.estimate(prompt);
            let prompt_tokens = estimate.total.saturating_sub(estimator.completion_allowance());
            let completion_tokens = estimator.count(&answer);
            warn!(
                model = %self.model,
                prompt_tokens,
                completion_tokens,
                "Provider reported no usage, using estimates"
            );
            collector.record_fallback(prompt_tokens, completion_tokens);
            UsageSource::Estimated
        } else {
            UsageSource::Reported
        };

        let usage = collector.snapshot();
        debug!(
            provider = self.provider_name(),
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_cost = usage.total_cost,
            ?usage_source,
            "Model call settled"
        );

        Ok(Invocation {
            answer,
            usage,
            usage_source,
            elapsed,
        })
    }
}
