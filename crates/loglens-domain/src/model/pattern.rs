//! `Pattern` and `PatternMatch` (spec §3, §4.5, §4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Assertion,
    Compilation,
    Dependency,
    Network,
    Permission,
    Syntax,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    Builtin,
    User,
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ContextRequirement {
    FileExists { path: String },
    LogContains { needle: String },
    NotContains { needle: String },
}

/// A named recognizer: compiled lazily, validated at load (spec §4.5).
/// `regexes` are stored as source strings in the on-disk format and
/// compiled by the pattern store; this domain type carries only the
/// strings so it stays serialization-round-trip safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub category: PatternCategory,
    pub regexes: Vec<String>,
    pub keywords: Vec<String>,
    pub context_requirements: Vec<ContextRequirement>,
    pub base_confidence: f64,
    pub success_rate: f64,
    pub occurrence_count: u64,
    pub source: PatternSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enabled: bool,
    /// Reason the pattern was disabled at runtime (e.g. regex failed to
    /// recompile), if any. Not part of the on-disk schema's required
    /// fields but preserved across writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    /// Unrecognized top-level keys are preserved verbatim for
    /// forward-compatible round-tripping (spec §6.1).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Pattern {
    /// Structural validation performed at load time (spec §4.5): every
    /// regex must compile and the id must be non-empty. Regex
    /// compilation itself is the pattern store's job since it owns the
    /// `regex::Regex` cache; this only checks shape invariants that are
    /// cheap to check on the raw strings.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("pattern id must not be empty".to_string());
        }
        if self.source == PatternSource::Learned && self.occurrence_count == 0 {
            return Err(format!(
                "learned pattern {} must carry a nonzero occurrence count",
                self.id
            ));
        }
        if !(0.0..=1.0).contains(&self.base_confidence) {
            return Err(format!(
                "pattern {} base_confidence {} out of [0,1]",
                self.id, self.base_confidence
            ));
        }
        Ok(())
    }
}

/// Evidence + scoring for one (failure, pattern) pairing (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub match_spans: Vec<(usize, usize)>,
    pub captures: HashMap<String, String>,
    pub context_snippet: String,
    pub match_strength: f64,
    pub confidence: f64,
    pub matched_regexes: Vec<String>,
    pub matched_keywords: Vec<String>,
    pub base_confidence: f64,
    pub success_rate: f64,
    pub occurrence_count: u64,
}

impl PatternMatch {
    /// spec §3 invariant: `final_confidence` bounds relative to base.
    pub fn confidence_bounds_hold(&self) -> bool {
        let upper = (self.base_confidence * 1.1).min(1.0);
        let lower = self.base_confidence * 0.5 * self.match_strength;
        self.confidence >= lower - 1e-9 && self.confidence <= upper + 1e-9
    }
}

/// Total order used to rank matches (spec §4.6): confidence desc,
/// success_rate desc, occurrence_count desc, pattern id asc.
pub fn compare_matches(a: &PatternMatch, b: &PatternMatch) -> std::cmp::Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
        .then_with(|| a.pattern_id.cmp(&b.pattern_id))
}
