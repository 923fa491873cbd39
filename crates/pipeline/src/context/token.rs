//! Token counting.
//!
//! The estimator counts the rendered prompt with a real BPE profile
//! (`cl100k_base` by default) via `tiktoken-rs`. A character heuristic is
//! kept for callers that cannot load an encoding table.

use personachat_core::error::{Error, Result};
use tiktoken_rs::CoreBPE;

/// Deterministic token counter for one encoding profile.
pub trait TokenCounter: Send + Sync {
    /// Encoding profile name.
    fn encoding(&self) -> &str;

    fn count(&self, text: &str) -> usize;
}

/// BPE counter backed by a tiktoken encoding table.
pub struct TiktokenCounter {
    encoding: String,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load a named encoding: `cl100k_base`, `o200k_base`, `p50k_base` or `r50k_base`.
    pub fn new(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(Error::Config {
                    message: format!("unknown token encoding '{other}'"),
                });
            }
        }
        .map_err(|e| Error::Internal(format!("failed to load {encoding}: {e}")))?;

        Ok(Self {
            encoding: encoding.to_string(),
            bpe,
        })
    }

    pub fn cl100k() -> Result<Self> {
        Self::new("cl100k_base")
    }
}

impl TokenCounter for TiktokenCounter {
    fn encoding(&self) -> &str {
        &self.encoding
    }

    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// ~4 characters per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristicCounter;

impl TokenCounter for CharHeuristicCounter {
    fn encoding(&self) -> &str {
        "chars/4"
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_rounds_up() {
        let c = CharHeuristicCounter;
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("test"), 1);
        assert_eq!(c.count("hello"), 2);
    }

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        // Five Hangul syllables: fifteen bytes, five chars.
        assert_eq!(CharHeuristicCounter.count("안녕하세요"), 2);
    }

    #[test]
    fn cl100k_is_deterministic() {
        let c = TiktokenCounter::cl100k().unwrap();
        let text = "I am Hong Gildong. Ask me anything.";
        let n = c.count(text);
        assert!(n > 0);
        assert!(n < text.len());
        assert_eq!(c.count(text), n);
        assert_eq!(c.count(""), 0);
        assert_eq!(c.encoding(), "cl100k_base");
    }

    #[test]
    fn unknown_encoding_is_a_config_error() {
        assert!(matches!(
            TiktokenCounter::new("nope_base"),
            Err(Error::Config { .. })
        ));
    }
}
