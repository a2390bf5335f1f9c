//! C7 Fix Template Store (spec §4.7, §6.2).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use loglens_domain::error::{LoglensError, Result};
use loglens_domain::model::{FixStep, FixTemplate};

use crate::versioned_store::{Snapshot, VersionedStore};

const BUILTIN_TEMPLATES_JSON: &str = include_str!("../resources/builtin_templates.json");

#[derive(Debug, Serialize, Deserialize)]
struct TemplateFile {
    templates: Vec<FixTemplate>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

pub struct TemplateIndex {
    pub by_id: HashMap<String, FixTemplate>,
    pub by_pattern_id: HashMap<String, Vec<String>>,
}

impl TemplateIndex {
    fn build(by_id: HashMap<String, FixTemplate>) -> Self {
        let mut by_pattern_id: HashMap<String, Vec<String>> = HashMap::new();
        for (id, template) in &by_id {
            for pattern_id in &template.applicable_pattern_ids {
                by_pattern_id.entry(pattern_id.clone()).or_default().push(id.clone());
            }
        }
        for ids in by_pattern_id.values_mut() {
            ids.sort();
        }
        TemplateIndex { by_id, by_pattern_id }
    }
}

pub struct TemplateStore {
    index: VersionedStore<TemplateIndex>,
}

fn validate_template(
    template: &FixTemplate,
    known_pattern_ids: &HashSet<String>,
    command_allowlist: &HashSet<String>,
) -> std::result::Result<(), String> {
    template.validate_shape()?;

    for pattern_id in &template.applicable_pattern_ids {
        if !known_pattern_ids.is_empty() && !known_pattern_ids.contains(pattern_id) {
            return Err(format!(
                "template {} references unknown pattern id {pattern_id}",
                template.id
            ));
        }
    }

    for (idx, step) in template.steps.iter().enumerate() {
        match step {
            FixStep::Command { argv, .. } => {
                if !command_allowlist.is_empty() && !command_allowlist.contains(&argv[0]) {
                    return Err(format!(
                        "template {} step {idx}: command '{}' is not on the allow-list",
                        template.id, argv[0]
                    ));
                }
            }
            FixStep::FileEdit { .. } | FixStep::FileCreate { .. } | FixStep::FileDelete { .. } => {
                // Path normalization already checked by validate_shape.
            }
        }
    }
    Ok(())
}

fn load_template_file(text: &str) -> Result<Vec<FixTemplate>> {
    let file: TemplateFile = serde_json::from_str(text).map_err(|e| LoglensError::Parse {
        message: format!("invalid template file: {e}"),
    })?;
    Ok(file.templates)
}

impl TemplateStore {
    pub fn load(
        user_dir: Option<&Path>,
        known_pattern_ids: &HashSet<String>,
        command_allowlist: &HashSet<String>,
    ) -> Result<Self> {
        let mut candidates = load_template_file(BUILTIN_TEMPLATES_JSON)?;

        if let Some(dir) = user_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match std::fs::read_to_string(&path).map_err(|e| e.to_string()).and_then(|text| {
                        load_template_file(&text).map_err(|e| e.to_string())
                    }) {
                        Ok(templates) => candidates.extend(templates),
                        Err(reason) => {
                            warn!(file = %path.display(), reason = %reason, "skipping corrupt user template file");
                        }
                    }
                }
            }
        }

        let mut by_id = HashMap::new();
        for template in candidates {
            match validate_template(&template, known_pattern_ids, command_allowlist) {
                Ok(()) => {
                    by_id.insert(template.id.clone(), template);
                }
                Err(reason) => {
                    warn!(template_id = %template.id, reason = %reason, "rejecting invalid fix template");
                }
            }
        }

        Ok(TemplateStore {
            index: VersionedStore::new(TemplateIndex::build(by_id)),
        })
    }

    pub fn version(&self) -> u64 {
        self.index.version()
    }

    pub fn snapshot(&self) -> Snapshot<TemplateIndex> {
        self.index.snapshot()
    }

    pub fn by_id(&self, id: &str) -> Option<FixTemplate> {
        self.index.snapshot().data.by_id.get(id).cloned()
    }

    /// Templates applicable to a given pattern id, per the one-way
    /// reference design (template → pattern ids; spec §9 redesign
    /// flag): lookups always go through the template store.
    pub fn for_pattern(&self, pattern_id: &str) -> Vec<FixTemplate> {
        let snap = self.index.snapshot();
        snap.data
            .by_pattern_id
            .get(pattern_id)
            .map(|ids| ids.iter().filter_map(|id| snap.data.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_load_with_matching_patterns() {
        let mut known = HashSet::new();
        known.insert("docker_permission_denied".to_string());
        known.insert("python_module_not_found".to_string());
        let mut allow = HashSet::new();
        allow.insert("pip".to_string());
        allow.insert("pytest".to_string());
        let store = TemplateStore::load(None, &known, &allow).unwrap();
        assert!(store.by_id("fix_docker_permission_denied").is_some());
        assert!(store.by_id("fix_python_module_not_found").is_some());
    }

    #[test]
    fn template_referencing_unknown_pattern_is_rejected() {
        let known = HashSet::new(); // empty known set bypasses the check via sentinel below
        let _ = known;
        let mut restricted_known = HashSet::new();
        restricted_known.insert("some_other_pattern".to_string());
        let allow = HashSet::new();
        let store = TemplateStore::load(None, &restricted_known, &allow).unwrap();
        // Both builtin templates reference patterns not in the known set.
        assert!(store.by_id("fix_docker_permission_denied").is_none());
    }

    #[test]
    fn for_pattern_returns_applicable_templates() {
        let mut known = HashSet::new();
        known.insert("docker_permission_denied".to_string());
        let allow = HashSet::new();
        let store = TemplateStore::load(None, &known, &allow).unwrap();
        let templates = store.for_pattern("docker_permission_denied");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, "fix_docker_permission_denied");
    }
}
