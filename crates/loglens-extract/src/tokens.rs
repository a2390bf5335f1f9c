//! C2 Token Counter (spec §4.2).
//!
//! Stands in for the out-of-scope pluggable tokenizer: a small builtin
//! table of bytes-per-token ratios per model family. The trait boundary
//! is exposed the same way `Provider` is (§6.5), so a real tokenizer can
//! be substituted without touching callers.

use loglens_domain::error::{LoglensError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Generic,
    Gpt,
    Claude,
}

impl ModelFamily {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "generic" => Ok(ModelFamily::Generic),
            "gpt" | "openai" => Ok(ModelFamily::Gpt),
            "claude" | "anthropic" => Ok(ModelFamily::Claude),
            other => Err(LoglensError::config(format!(
                "unknown model family '{other}'"
            ))),
        }
    }

    /// Approximate bytes per token for this family.
    fn bytes_per_token(self) -> f64 {
        match self {
            ModelFamily::Generic => 4.0,
            ModelFamily::Gpt => 4.0,
            ModelFamily::Claude => 3.5,
        }
    }
}

/// A pluggable token counter. `count` stands in for the spec's "pluggable
/// tokenizer per family".
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str, family: ModelFamily) -> u32;
}

pub struct ApproximateTokenCounter;

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, text: &str, family: ModelFamily) -> u32 {
        let bytes = text.len() as f64;
        let ratio = family.bytes_per_token();
        (bytes / ratio).ceil() as u32
    }
}

/// Estimate the token count of `text` for `model_family`. Deterministic
/// and monotonic in `text.len()` for a fixed family.
pub fn count(text: &str, model_family: &str) -> Result<u32> {
    let family = ModelFamily::parse(model_family)?;
    Ok(ApproximateTokenCounter.count(text, family))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_family_is_an_error() {
        assert!(count("hello", "cobol-lm").is_err());
    }

    #[test]
    fn monotonic_in_length() {
        let short = count("hello", "generic").unwrap();
        let long = count("hello world, this is much longer text", "generic").unwrap();
        assert!(long > short);
    }

    #[test]
    fn deterministic_for_fixed_family() {
        let a = count("the quick brown fox", "gpt").unwrap();
        let b = count("the quick brown fox", "gpt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_has_zero_tokens() {
        assert_eq!(count("", "generic").unwrap(), 0);
    }
}
