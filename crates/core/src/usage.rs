//! Token accounting value types.

use serde::{Deserialize, Serialize};

/// Pre-flight prediction of a turn's token cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    /// Tokenizer count of the fully rendered prompt.
    pub raw_prompt_tokens: u64,
    /// `raw_prompt_tokens` scaled by the correction factor.
    pub corrected_prompt_tokens: u64,
    /// Fixed reply allowance.
    pub completion_estimate: u64,
    /// `corrected_prompt_tokens + completion_estimate`
    pub total: u64,
}

/// Token and cost accounting for one turn.
///
/// Freshly allocated per turn; never shared across turns or sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub successful_requests: u64,
    pub total_cost: f64,
}

impl UsageRecord {
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_record_serializes_with_exact_field_names() {
        let rec = UsageRecord {
            prompt_tokens: 120,
            completion_tokens: 40,
            total_tokens: 160,
            successful_requests: 1,
            total_cost: 0.01,
        };
        let v = serde_json::to_value(rec).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "completion_tokens",
                "prompt_tokens",
                "successful_requests",
                "total_cost",
                "total_tokens"
            ]
        );
    }
}
