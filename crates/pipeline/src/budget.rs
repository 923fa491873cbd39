//! Pre-flight token estimation and the budget gate.
//!
//! `total = ceil(raw * correction_factor) + completion_allowance`, where
//! `raw` is the tokenizer count of the fully rendered prompt. The gate
//! rejects a turn whose `total` exceeds the caller's remaining balance,
//! before any billable call is made.

use std::sync::Arc;

use personachat_core::account::AccountService;
use personachat_core::error::{Error, Result};
use personachat_core::usage::TokenEstimate;
use tracing::{debug, info};

use crate::context::TokenCounter;

pub const DEFAULT_CORRECTION_FACTOR: f64 = 0.85;
pub const DEFAULT_COMPLETION_ALLOWANCE: u64 = 500;

/// Predicts a turn's token cost from its rendered prompt.
#[derive(Clone)]
pub struct TokenEstimator {
    counter: Arc<dyn TokenCounter>,
    correction_factor: f64,
    completion_allowance: u64,
}

impl TokenEstimator {
    pub fn new(counter: Arc<dyn TokenCounter>, correction_factor: f64, completion_allowance: u64) -> Self {
        Self {
            counter,
            correction_factor,
            completion_allowance,
        }
    }

    pub fn completion_allowance(&self) -> u64 {
        self.completion_allowance
    }

    /// Raw tokenizer count, no correction.
    pub fn count(&self, text: &str) -> u64 {
        self.counter.count(text) as u64
    }

    pub fn estimate(&self, prompt: &str) -> TokenEstimate {
        let raw_prompt_tokens = self.count(prompt);
        let corrected_prompt_tokens = (raw_prompt_tokens as f64 * self.correction_factor).ceil() as u64;
        let estimate = TokenEstimate {
            raw_prompt_tokens,
            corrected_prompt_tokens,
            completion_estimate: self.completion_allowance,
            total: corrected_prompt_tokens + self.completion_allowance,
        };
        debug!(
            encoding = self.counter.encoding(),
            raw = estimate.raw_prompt_tokens,
            corrected = estimate.corrected_prompt_tokens,
            total = estimate.total,
            "Estimated prompt"
        );
        estimate
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("encoding", &self.counter.encoding())
            .field("correction_factor", &self.correction_factor)
            .field("completion_allowance", &self.completion_allowance)
            .finish()
    }
}

/// Rejects turns the caller cannot afford.
#[derive(Clone)]
pub struct BudgetGate {
    account: Arc<dyn AccountService>,
}

impl BudgetGate {
    pub fn new(account: Arc<dyn AccountService>) -> Self {
        Self { account }
    }

    pub async fn remaining(&self, user_id: &str) -> Result<u64> {
        Ok(self.account.remaining_tokens(user_id).await?)
    }

    /// Check an estimate against a remaining balance already fetched.
    pub fn admit(estimate: &TokenEstimate, remaining: u64) -> Result<()> {
        if estimate.total > remaining {
            return Err(Error::InsufficientBudget {
                required: estimate.total,
                remaining,
            });
        }
        Ok(())
    }

    /// Fetch the balance and check the estimate against it. Returns the balance.
    pub async fn check(&self, user_id: &str, estimate: &TokenEstimate) -> Result<u64> {
        let remaining = self.remaining(user_id).await?;
        let verdict = Self::admit(estimate, remaining);
        info!(
            user_id,
            estimated = estimate.total,
            remaining,
            admitted = verdict.is_ok(),
            "Budget check"
        );
        verdict.map(|()| remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CharHeuristicCounter;
    use crate::test_helpers::FixedAccount;

    fn estimator() -> TokenEstimator {
        TokenEstimator::new(Arc::new(CharHeuristicCounter), 0.85, 500)
    }

    #[test]
    fn estimate_applies_correction_then_allowance() {
        // 40 chars -> 10 raw tokens -> ceil(8.5) = 9 corrected
        let e = estimator().estimate(&"a".repeat(40));
        assert_eq!(e.raw_prompt_tokens, 10);
        assert_eq!(e.corrected_prompt_tokens, 9);
        assert_eq!(e.completion_estimate, 500);
        assert_eq!(e.total, 509);
    }

    #[test]
    fn empty_prompt_costs_only_the_allowance() {
        let e = estimator().estimate("");
        assert_eq!(e.corrected_prompt_tokens, 0);
        assert_eq!(e.total, 500);
    }

    #[test]
    fn estimate_is_idempotent() {
        let est = estimator();
        assert_eq!(est.estimate("same prompt"), est.estimate("same prompt"));
    }

    #[test]
    fn admit_boundary() {
        let e = estimator().estimate("");
        assert!(BudgetGate::admit(&e, 500).is_ok());
        match BudgetGate::admit(&e, 499) {
            Err(Error::InsufficientBudget { required, remaining }) => {
                assert_eq!(required, 500);
                assert_eq!(remaining, 499);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gate_uses_account_balance() {
        let gate = BudgetGate::new(Arc::new(FixedAccount::new(100)));
        let e = estimator().estimate("hello");
        let err = gate.check("u1", &e).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_budget");
        assert_eq!(err.status_code(), 400);

        let gate = BudgetGate::new(Arc::new(FixedAccount::new(5000)));
        assert_eq!(gate.check("u1", &e).await.unwrap(), 5000);
    }
}
