//! C6 Pattern Matcher (spec §4.6).

use std::collections::HashMap;
use std::path::Path;

use loglens_domain::model::{compare_matches, ContextRequirement, Failure, PatternMatch};

use crate::pattern_store::CompiledPattern;

const DEFAULT_WORKER_COUNT: usize = 4;

fn context_gate_holds(requirements: &[ContextRequirement], project_root: &Path, log_text: &str) -> bool {
    requirements.iter().all(|req| match req {
        ContextRequirement::FileExists { path } => project_root.join(path).exists(),
        ContextRequirement::LogContains { needle } => log_text.contains(needle.as_str()),
        ContextRequirement::NotContains { needle } => !log_text.contains(needle.as_str()),
    })
}

struct RegexPhaseResult {
    spans: Vec<(usize, usize)>,
    captures: HashMap<String, String>,
    matched_regexes: Vec<String>,
}

fn regex_phase(compiled: &CompiledPattern, failure: &Failure) -> RegexPhaseResult {
    let haystacks = [
        failure.message.as_str(),
        failure.stack_trace.as_deref().unwrap_or(""),
    ];
    let mut spans = Vec::new();
    let mut captures = HashMap::new();
    let mut matched_regexes = Vec::new();

    for (src, regex) in compiled.pattern.regexes.iter().zip(compiled.compiled_regexes.iter()) {
        for haystack in haystacks {
            if let Some(m) = regex.find(haystack) {
                spans.push((m.start(), m.end()));
                matched_regexes.push(src.clone());
                if let Some(caps) = regex.captures(haystack) {
                    for name in regex.capture_names().flatten() {
                        if let Some(value) = caps.name(name) {
                            captures.insert(name.to_string(), value.as_str().to_string());
                        }
                    }
                }
                break;
            }
        }
    }

    RegexPhaseResult {
        spans,
        captures,
        matched_regexes,
    }
}

fn keyword_phase(compiled: &CompiledPattern, failure: &Failure) -> Vec<String> {
    let text = failure.combined_text().to_ascii_lowercase();
    compiled
        .pattern
        .keywords
        .iter()
        .filter(|kw| text.contains(&kw.to_ascii_lowercase()))
        .cloned()
        .collect()
}

fn ratio_or_one(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Match one failure against one candidate pattern. Returns `None` if
/// the context gate fails, the keyword minimum isn't met, or confidence
/// falls below `theta` (spec §4.6 steps 1-6).
fn match_one(
    compiled: &CompiledPattern,
    failure: &Failure,
    project_root: &Path,
    log_text: &str,
    theta: f64,
) -> Option<PatternMatch> {
    if !context_gate_holds(&compiled.pattern.context_requirements, project_root, log_text) {
        return None;
    }

    let regex_result = regex_phase(compiled, failure);
    let matched_keywords = keyword_phase(compiled, failure);

    let keyword_minimum = (compiled.pattern.keywords.len() as f64 / 2.0).ceil() as usize;
    if !compiled.pattern.keywords.is_empty() && matched_keywords.len() < keyword_minimum {
        return None;
    }

    let regex_ratio = ratio_or_one(regex_result.matched_regexes.len(), compiled.pattern.regexes.len());
    let keyword_ratio = ratio_or_one(matched_keywords.len(), compiled.pattern.keywords.len());
    // Captures denominator is the number of distinct named groups across
    // the pattern's regexes.
    let capture_slots: usize = compiled
        .compiled_regexes
        .iter()
        .map(|r| r.capture_names().flatten().count())
        .sum();
    let capture_ratio = ratio_or_one(regex_result.captures.len(), capture_slots);

    let match_strength = 0.6 * regex_ratio + 0.3 * keyword_ratio + 0.1 * capture_ratio;

    let confidence = (compiled.pattern.base_confidence
        * (0.5 + 0.5 * match_strength)
        * (0.5 + 0.5 * compiled.pattern.success_rate))
        .clamp(0.0, 1.0);

    if confidence < theta {
        return None;
    }

    Some(PatternMatch {
        pattern_id: compiled.pattern.id.clone(),
        match_spans: regex_result.spans,
        captures: regex_result.captures,
        context_snippet: failure.combined_text(),
        match_strength,
        confidence,
        matched_regexes: regex_result.matched_regexes,
        matched_keywords,
        base_confidence: compiled.pattern.base_confidence,
        success_rate: compiled.pattern.success_rate,
        occurrence_count: compiled.pattern.occurrence_count,
    })
}

/// Match every enabled pattern against every failure in `failures`.
/// Failures are fanned out across a small bounded pool of OS threads
/// (spec §5 scheduling model); the merge step is sequential and
/// deterministic so ranking never depends on thread scheduling.
pub fn match_failures(
    failures: &[Failure],
    patterns: &[CompiledPattern],
    project_root: &Path,
    log_text: &str,
    theta: f64,
) -> Vec<PatternMatch> {
    if patterns.is_empty() || failures.is_empty() {
        return Vec::new();
    }

    let worker_count = DEFAULT_WORKER_COUNT.min(failures.len()).max(1);
    let chunk_size = failures.len().div_ceil(worker_count);

    let mut all_matches: Vec<PatternMatch> = std::thread::scope(|scope| {
        let handles: Vec<_> = failures
            .chunks(chunk_size.max(1))
            .map(|chunk| {
                scope.spawn(move || {
                    let mut local = Vec::new();
                    for failure in chunk {
                        // Duplicate suppression per (failure, pattern):
                        // keep only the highest-confidence match.
                        let mut best: HashMap<&str, PatternMatch> = HashMap::new();
                        for compiled in patterns {
                            if !compiled.pattern.enabled {
                                continue;
                            }
                            if let Some(m) =
                                match_one(compiled, failure, project_root, log_text, theta)
                            {
                                best.entry(compiled.pattern.id.as_str())
                                    .and_modify(|existing| {
                                        if m.confidence > existing.confidence {
                                            *existing = m.clone();
                                        }
                                    })
                                    .or_insert(m);
                            }
                        }
                        local.extend(best.into_values());
                    }
                    local
                })
            })
            .collect();

        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    all_matches.sort_by(compare_matches);
    all_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loglens_domain::model::{FailureKind, Fingerprint, Pattern, PatternCategory, PatternSource};
    use regex::Regex;

    fn make_pattern(id: &str, regex: &str, keywords: Vec<&str>, base_confidence: f64, success_rate: f64) -> CompiledPattern {
        let pattern = Pattern {
            id: id.to_string(),
            name: id.to_string(),
            category: PatternCategory::Unknown,
            regexes: vec![regex.to_string()],
            keywords: keywords.into_iter().map(|s| s.to_string()).collect(),
            context_requirements: vec![],
            base_confidence,
            success_rate,
            occurrence_count: 10,
            source: PatternSource::Builtin,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            enabled: true,
            disabled_reason: None,
            extra: Default::default(),
        };
        CompiledPattern {
            compiled_regexes: vec![Regex::new(regex).unwrap()],
            pattern,
        }
    }

    fn make_failure(message: &str) -> Failure {
        Failure {
            kind: FailureKind::Permission,
            message: message.to_string(),
            file_path: None,
            line_number: None,
            context_before: vec![],
            context_after: vec![],
            stack_trace: None,
            fingerprint: Fingerprint::compute(message, FailureKind::Permission, ""),
            occurrence_count: 1,
        }
    }

    #[test]
    fn empty_store_yields_empty_and_no_error() {
        let failures = vec![make_failure("permission denied")];
        let matches = match_failures(&failures, &[], Path::new("."), "", 0.6);
        assert!(matches.is_empty());
    }

    #[test]
    fn matches_strong_pattern_above_threshold() {
        let pattern = make_pattern(
            "docker_permission_denied",
            "(?i)permission denied",
            vec!["permission", "denied"],
            0.9,
            0.85,
        );
        let failures = vec![make_failure("permission denied while talking to docker")];
        let matches = match_failures(&failures, &[pattern], Path::new("."), "", 0.6);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].confidence >= 0.6);
    }

    #[test]
    fn ranking_is_a_total_order() {
        let p1 = make_pattern("a", "foo", vec!["foo"], 0.9, 0.9);
        let p2 = make_pattern("b", "foo", vec!["foo"], 0.9, 0.9);
        let failures = vec![make_failure("foo bar")];
        let matches = match_failures(&failures, &[p1, p2], Path::new("."), "", 0.1);
        // Same confidence/success_rate/occurrence -> tie-break on id.
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].pattern_id, "a");
        assert_eq!(matches[1].pattern_id, "b");
    }

    #[test]
    fn confidence_bounds_hold() {
        let pattern = make_pattern("x", "(?i)boom", vec!["boom"], 0.7, 0.6);
        let failures = vec![make_failure("boom")];
        let matches = match_failures(&failures, &[pattern], Path::new("."), "", 0.0);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].confidence_bounds_hold());
    }
}
