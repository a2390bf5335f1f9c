//! C12 Learning Engine (spec §4.12).

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::info;

use loglens_domain::error::Result;
use loglens_domain::model::{Pattern, PatternCategory, PatternSource, UserFeedback};
use loglens_patterns::PatternStore;

/// Applies the EWMA stat update for every feedback record not yet seen.
/// `processed` tracks feedback ids already folded into a pattern's
/// `success_rate`, making repeated calls over the same feedback log
/// idempotent (spec §4.12 invariant).
pub fn apply_feedback(
    store: &PatternStore,
    feedback: &[UserFeedback],
    processed: &mut HashSet<uuid::Uuid>,
    decay_alpha: f64,
) -> Result<u64> {
    let mut applied = 0u64;
    for fb in feedback {
        if processed.contains(&fb.id) {
            continue;
        }
        if store.by_id(&fb.pattern_id).is_some() {
            store.update_stats(&fb.pattern_id, fb.success, decay_alpha)?;
            applied += 1;
        }
        processed.insert(fb.id);
    }
    Ok(applied)
}

/// A minimal, unpromoted recognizer mined from recurring failure text
/// (spec §4.12). Not inserted into the pattern store until
/// `promote_candidate` is called by an operator-facing flow.
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub suggested_regex: String,
    pub keywords: Vec<String>,
    pub occurrence_count: usize,
    pub sample_texts: Vec<String>,
}

fn shingles(text: &str, n: usize) -> HashSet<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < n {
        return tokens.iter().map(|t| t.to_string()).collect();
    }
    tokens
        .windows(n)
        .map(|w| w.join(" "))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Longest common substring across a cluster's member texts, used as
/// the seed for a candidate's regex (spec §4.12). Falls back to the
/// shortest text verbatim if no shared substring clears the minimum
/// length.
fn longest_common_substring<'a>(texts: &[&'a str]) -> Option<String> {
    let first = texts.first()?;
    let mut best = String::new();
    let chars: Vec<char> = first.chars().collect();
    for start in 0..chars.len() {
        for end in (start + 1..=chars.len()).rev() {
            let candidate: String = chars[start..end].iter().collect();
            if candidate.trim().len() < 8 {
                continue;
            }
            if texts.iter().all(|t| t.contains(&candidate)) && candidate.len() > best.len() {
                best = candidate;
            }
        }
    }
    if best.is_empty() {
        None
    } else {
        Some(best)
    }
}

fn top_keywords(texts: &[&str], top_k: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        let mut seen_in_this_text = HashSet::new();
        for word in text.split_whitespace() {
            let normalized: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if normalized.len() < 4 {
                continue;
            }
            if seen_in_this_text.insert(normalized.clone()) {
                *freq.entry(normalized).or_insert(0) += 1;
            }
        }
    }
    let mut pairs: Vec<(String, usize)> = freq.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.into_iter().take(top_k).map(|(k, _)| k).collect()
}

/// Clusters `unmatched_texts` by token-shingle Jaccard similarity and
/// emits a candidate per cluster with at least `min_occurrences`
/// members (spec §4.12). Clustering is a single greedy pass: each text
/// joins the first cluster whose representative clears `similarity`,
/// else starts a new cluster. Deterministic given a stable input order.
pub fn discover_candidates(
    unmatched_texts: &[String],
    min_occurrences: usize,
    similarity: f64,
) -> Vec<PatternCandidate> {
    let mut clusters: Vec<Vec<&str>> = Vec::new();
    let mut cluster_shingles: Vec<HashSet<String>> = Vec::new();

    for text in unmatched_texts {
        let sh = shingles(text, 3);
        let mut placed = false;
        for (idx, rep_shingles) in cluster_shingles.iter().enumerate() {
            if jaccard(&sh, rep_shingles) >= similarity {
                clusters[idx].push(text.as_str());
                placed = true;
                break;
            }
        }
        if !placed {
            clusters.push(vec![text.as_str()]);
            cluster_shingles.push(sh);
        }
    }

    clusters
        .into_iter()
        .filter(|members| members.len() >= min_occurrences)
        .filter_map(|members| {
            let seed = longest_common_substring(&members).unwrap_or_else(|| members[0].to_string());
            let keywords = top_keywords(&members, 5);
            if keywords.is_empty() {
                return None;
            }
            Some(PatternCandidate {
                suggested_regex: regex::escape(seed.trim()),
                keywords,
                occurrence_count: members.len(),
                sample_texts: members.iter().take(3).map(|s| s.to_string()).collect(),
            })
        })
        .collect()
}

/// Inserts `candidate` into the pattern store as an enabled, learned
/// pattern under `id`. This is the only path by which a mined candidate
/// becomes a live recognizer; discovery alone never mutates the store
/// (spec §4.12).
pub fn promote_candidate(store: &PatternStore, id: &str, name: &str, candidate: &PatternCandidate) -> Result<()> {
    let now = Utc::now();
    let pattern = Pattern {
        id: id.to_string(),
        name: name.to_string(),
        category: PatternCategory::Unknown,
        regexes: vec![candidate.suggested_regex.clone()],
        keywords: candidate.keywords.clone(),
        context_requirements: vec![],
        base_confidence: 0.5,
        success_rate: 0.0,
        occurrence_count: candidate.occurrence_count as u64,
        source: PatternSource::Learned,
        created_at: now,
        updated_at: now,
        enabled: true,
        disabled_reason: None,
        extra: HashMap::new(),
    };
    info!(pattern_id = %id, occurrences = candidate.occurrence_count, "promoting learned pattern candidate");
    store.upsert_learned(pattern)
}
