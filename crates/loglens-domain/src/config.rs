//! `EngineConfig` — a single explicit-field configuration record.
//!
//! REDESIGN FLAGS (spec §9): no dynamic/duck-typed config objects. Every
//! knob the core consults is a named field here; optional values are
//! `Option<T>`, never a sentinel. Loading this from a config file is out
//! of scope (spec §1) — callers construct it programmatically, with
//! [`EngineConfig::default`] supplying the documented defaults.

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Token budget target for the log compressor (C3).
    pub token_budget: u32,
    /// Model family name used by the token counter (C2).
    pub model_family: String,
    /// Lines of context kept before/after a failure signal (C4).
    pub context_lines: u32,
    /// Minimum confidence θ for the pattern matcher to emit a match (C6).
    pub confidence_threshold: f64,
    /// Maximum risk an auto-fix may carry unattended (C8/C10).
    pub auto_fix_risk_tolerance: crate::model::template::Risk,
    /// Minimum confidence for `auto_applicable` (C8).
    pub auto_fix_confidence_threshold: f64,
    /// Per-command timeout inside an auto-fix, in seconds (C10, §5).
    pub command_timeout_secs: u64,
    /// Per-request wall-clock timeout, in seconds (§5).
    pub request_timeout_secs: u64,
    /// Response cache TTL, in seconds (C13).
    pub cache_ttl_secs: u64,
    /// Response cache size budget, in bytes (C13).
    pub cache_byte_budget: u64,
    /// Filesystem mutation lock retry window, in seconds (§5).
    pub lock_retry_window_secs: u64,
    /// Feedback log fsync batch size (C11).
    pub feedback_fsync_batch_size: u32,
    /// Feedback log fsync interval, in seconds (C11).
    pub feedback_fsync_interval_secs: u64,
    /// EWMA decay α for pattern success-rate updates (C12).
    pub learning_decay_alpha: f64,
    /// Minimum occurrences for a candidate pattern to be proposed (C12).
    pub candidate_min_occurrences: u32,
    /// Minimum Jaccard similarity for candidate grouping (C12).
    pub candidate_similarity_threshold: f64,
    /// Snapshot retention window, in seconds, consulted by `gc` (C9).
    pub snapshot_retention_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            token_budget: 8_000,
            model_family: "generic".to_string(),
            context_lines: 5,
            confidence_threshold: 0.6,
            auto_fix_risk_tolerance: crate::model::template::Risk::Low,
            auto_fix_confidence_threshold: 0.8,
            command_timeout_secs: 60,
            request_timeout_secs: 300,
            cache_ttl_secs: 24 * 60 * 60,
            cache_byte_budget: 64 * 1024 * 1024,
            lock_retry_window_secs: 30,
            feedback_fsync_batch_size: 20,
            feedback_fsync_interval_secs: 5,
            learning_decay_alpha: 0.2,
            candidate_min_occurrences: 3,
            candidate_similarity_threshold: 0.7,
            snapshot_retention_secs: Some(30 * 24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.confidence_threshold, 0.6);
        assert_eq!(cfg.context_lines, 5);
        assert_eq!(cfg.command_timeout_secs, 60);
        assert_eq!(cfg.request_timeout_secs, 300);
        assert_eq!(cfg.learning_decay_alpha, 0.2);
        assert_eq!(cfg.lock_retry_window_secs, 30);
    }
}
