//! C5 Pattern Store (spec §4.5, §6.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use loglens_domain::error::{LoglensError, Result};
use loglens_domain::model::{Pattern, PatternCategory, PatternSource};

use crate::versioned_store::{Snapshot, VersionedStore};

const BUILTIN_PATTERNS_JSON: &str = include_str!("../resources/builtin_patterns.json");

#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    patterns: Vec<Pattern>,
    /// Unrecognized top-level keys, preserved for round-trip safety
    /// (spec §6.1).
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// A pattern plus its lazily (re)compiled regexes. Compilation happens
/// once at load; a pattern whose regex fails to recompile at runtime is
/// quarantined rather than dropped (spec §4.6 failure semantics).
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: Pattern,
    pub compiled_regexes: Vec<Regex>,
}

pub struct PatternIndex {
    pub by_id: HashMap<String, CompiledPattern>,
    pub by_category: HashMap<PatternCategory, Vec<String>>,
}

impl PatternIndex {
    fn rebuild_category_index(by_id: &HashMap<String, CompiledPattern>) -> HashMap<PatternCategory, Vec<String>> {
        let mut by_category: HashMap<PatternCategory, Vec<String>> = HashMap::new();
        for (id, cp) in by_id {
            by_category
                .entry(cp.pattern.category)
                .or_default()
                .push(id.clone());
        }
        for ids in by_category.values_mut() {
            ids.sort();
        }
        by_category
    }
}

pub struct PatternStore {
    index: VersionedStore<PatternIndex>,
    learned_store_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

fn compile_pattern(pattern: Pattern) -> std::result::Result<CompiledPattern, String> {
    pattern.validate_shape()?;
    let mut compiled_regexes = Vec::with_capacity(pattern.regexes.len());
    for src in &pattern.regexes {
        match Regex::new(src) {
            Ok(re) => compiled_regexes.push(re),
            Err(e) => return Err(format!("pattern {} regex '{src}' failed: {e}", pattern.id)),
        }
    }
    Ok(CompiledPattern {
        pattern,
        compiled_regexes,
    })
}

fn load_pattern_file(text: &str) -> Result<Vec<Pattern>> {
    let file: PatternFile = serde_json::from_str(text)
        .map_err(|e| LoglensError::Parse {
            message: format!("invalid pattern file: {e}"),
        })?;
    Ok(file.patterns)
}

fn index_with_precedence(sources: Vec<(PatternSource, Vec<Pattern>)>) -> PatternIndex {
    // Collision precedence: user > learned > builtin. We insert builtin
    // first, then learned, then user, so later inserts win.
    let mut ordered = sources;
    ordered.sort_by_key(|(source, _)| match source {
        PatternSource::Builtin => 0,
        PatternSource::Learned => 1,
        PatternSource::User => 2,
    });

    let mut by_id: HashMap<String, CompiledPattern> = HashMap::new();
    for (_source, patterns) in ordered {
        for pattern in patterns {
            let id = pattern.id.clone();
            match compile_pattern(pattern) {
                Ok(compiled) => {
                    by_id.insert(id, compiled);
                }
                Err(reason) => {
                    warn!(pattern_id = %id, reason = %reason, "skipping invalid pattern");
                }
            }
        }
    }
    let by_category = PatternIndex::rebuild_category_index(&by_id);
    PatternIndex { by_id, by_category }
}

impl PatternStore {
    /// Load builtin patterns (embedded), user patterns from
    /// `user_dir` (every `*.json` file, best-effort), and learned
    /// patterns from `learned_store_path` if it exists. A corrupt user
    /// or learned file is logged and skipped; the store still starts
    /// with whatever loaded successfully (spec §4.5 failure mode).
    pub fn load(user_dir: Option<&Path>, learned_store_path: Option<&Path>) -> Result<Self> {
        let builtin = load_pattern_file(BUILTIN_PATTERNS_JSON)?
            .into_iter()
            .map(|mut p| {
                p.source = PatternSource::Builtin;
                p
            })
            .collect();

        let mut user = Vec::new();
        if let Some(dir) = user_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|text| {
                        load_pattern_file(&text).map_err(|e| e.to_string())
                    }) {
                        Ok(patterns) => {
                            for mut p in patterns {
                                p.source = PatternSource::User;
                                user.push(p);
                            }
                        }
                        Err(reason) => {
                            warn!(file = %path.display(), reason = %reason, "skipping corrupt user pattern file");
                        }
                    }
                }
            }
        }

        let mut learned = Vec::new();
        if let Some(path) = learned_store_path {
            if path.exists() {
                match std::fs::read_to_string(path)
                    .map_err(|e| e.to_string())
                    .and_then(|text| load_pattern_file(&text).map_err(|e| e.to_string()))
                {
                    Ok(patterns) => learned = patterns,
                    Err(reason) => {
                        warn!(file = %path.display(), reason = %reason, "skipping corrupt learned pattern store");
                    }
                }
            }
        }

        debug!(
            builtin = builtin.len(),
            user = user.len(),
            learned = learned.len(),
            "loaded pattern sources"
        );

        let index = index_with_precedence(vec![
            (PatternSource::Builtin, builtin),
            (PatternSource::User, user),
            (PatternSource::Learned, learned),
        ]);

        Ok(PatternStore {
            index: VersionedStore::new(index),
            learned_store_path: learned_store_path.map(|p| p.to_path_buf()),
            write_lock: Mutex::new(()),
        })
    }

    pub fn version(&self) -> u64 {
        self.index.version()
    }

    pub fn snapshot(&self) -> Snapshot<PatternIndex> {
        self.index.snapshot()
    }

    pub fn all_enabled(&self, category_filter: Option<PatternCategory>) -> Vec<Pattern> {
        let snap = self.index.snapshot();
        let mut out: Vec<Pattern> = snap
            .data
            .by_id
            .values()
            .filter(|cp| cp.pattern.enabled)
            .filter(|cp| category_filter.map(|c| c == cp.pattern.category).unwrap_or(true))
            .map(|cp| cp.pattern.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn by_id(&self, id: &str) -> Option<Pattern> {
        let snap = self.index.snapshot();
        snap.data.by_id.get(id).map(|cp| cp.pattern.clone())
    }

    /// Quarantine a pattern whose regex failed to recompile at runtime
    /// (spec §4.6 failure semantics): `enabled=false` with a reason.
    pub fn quarantine(&self, id: &str, reason: &str) {
        let _guard = self.write_lock.lock().expect("pattern store write lock poisoned");
        self.index.write(|current| {
            let mut by_id = current.by_id.clone();
            if let Some(cp) = by_id.get_mut(id) {
                cp.pattern.enabled = false;
                cp.pattern.disabled_reason = Some(reason.to_string());
                cp.pattern.updated_at = Utc::now();
            }
            let by_category = PatternIndex::rebuild_category_index(&by_id);
            PatternIndex { by_id, by_category }
        });
    }

    pub fn upsert_learned(&self, pattern: Pattern) -> Result<()> {
        pattern
            .validate_shape()
            .map_err(LoglensError::validation)?;
        let _guard = self.write_lock.lock().expect("pattern store write lock poisoned");

        let compiled = compile_pattern(pattern.clone()).map_err(LoglensError::validation)?;

        self.index.write(|current| {
            let mut by_id = current.by_id.clone();
            by_id.insert(pattern.id.clone(), compiled.clone());
            let by_category = PatternIndex::rebuild_category_index(&by_id);
            PatternIndex { by_id, by_category }
        });

        self.persist_learned()
    }

    pub fn update_stats(&self, id: &str, success: bool, decay_alpha: f64) -> Result<()> {
        let _guard = self.write_lock.lock().expect("pattern store write lock poisoned");
        let mut found = false;
        self.index.write(|current| {
            let mut by_id = current.by_id.clone();
            if let Some(cp) = by_id.get_mut(id) {
                found = true;
                let observation = if success { 1.0 } else { 0.0 };
                cp.pattern.success_rate =
                    decay_alpha * observation + (1.0 - decay_alpha) * cp.pattern.success_rate;
                cp.pattern.occurrence_count += 1;
                cp.pattern.updated_at = Utc::now();
            }
            let by_category = PatternIndex::rebuild_category_index(&by_id);
            PatternIndex { by_id, by_category }
        });
        if !found {
            return Err(LoglensError::validation(format!("unknown pattern id {id}")));
        }
        self.persist_learned()
    }

    /// Persist the learned-source subset to disk. A write failure
    /// leaves in-memory state untouched and is returned to the caller
    /// (spec §4.5 failure mode).
    fn persist_learned(&self) -> Result<()> {
        let Some(path) = &self.learned_store_path else {
            return Ok(());
        };
        let snap = self.index.snapshot();
        let learned: Vec<Pattern> = snap
            .data
            .by_id
            .values()
            .filter(|cp| cp.pattern.source == PatternSource::Learned)
            .map(|cp| cp.pattern.clone())
            .collect();
        let file = PatternFile {
            patterns: learned,
            extra: HashMap::new(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| LoglensError::Parse {
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LoglensError::io("creating learned store directory", e))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())
            .map_err(|e| LoglensError::io("writing learned store temp file", e))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| LoglensError::io("renaming learned store temp file", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_in_memory_store() -> PatternStore {
        PatternStore::load(None, None).unwrap()
    }

    #[test]
    fn builtin_patterns_load_successfully() {
        let store = new_in_memory_store();
        assert!(store.by_id("docker_permission_denied").is_some());
        assert!(store.by_id("python_module_not_found").is_some());
    }

    #[test]
    fn all_enabled_respects_category_filter() {
        let store = new_in_memory_store();
        let deps = store.all_enabled(Some(PatternCategory::Dependency));
        assert!(deps.iter().all(|p| p.category == PatternCategory::Dependency));
        assert!(!deps.is_empty());
    }

    #[test]
    fn upsert_learned_bumps_version() {
        let store = new_in_memory_store();
        let v0 = store.version();
        let pattern = Pattern {
            id: "custom_widget_not_found".into(),
            name: "Custom widget not found".into(),
            category: PatternCategory::Unknown,
            regexes: vec![r"widget not found".to_string()],
            keywords: vec!["widget".into()],
            context_requirements: vec![],
            base_confidence: 0.5,
            success_rate: 0.0,
            occurrence_count: 5,
            source: PatternSource::Learned,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            enabled: false,
            disabled_reason: None,
            extra: HashMap::new(),
        };
        store.upsert_learned(pattern).unwrap();
        assert!(store.version() > v0);
        assert!(store.by_id("custom_widget_not_found").is_some());
    }

    #[test]
    fn update_stats_applies_ewma() {
        let store = new_in_memory_store();
        let before = store.by_id("docker_permission_denied").unwrap().success_rate;
        store.update_stats("docker_permission_denied", true, 0.2).unwrap();
        let after = store.by_id("docker_permission_denied").unwrap().success_rate;
        assert!(after >= before);
    }

    #[test]
    fn unknown_id_update_stats_is_an_error() {
        let store = new_in_memory_store();
        assert!(store.update_stats("does-not-exist", true, 0.2).is_err());
    }

    #[test]
    fn corrupt_user_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        let store = PatternStore::load(Some(dir.path()), None).unwrap();
        // Still has builtins even though the user file was corrupt.
        assert!(store.by_id("docker_permission_denied").is_some());
    }
}
