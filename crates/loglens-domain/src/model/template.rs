//! `FixTemplate`, `FixStep`, and `FixSuggestion` (spec §3, §4.7, §4.8).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Append,
    Prepend,
    Replace,
    RegexSubstitute,
}

/// One unit of a fix recipe (spec §3, §6.2 `type` discriminator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixStep {
    FileEdit {
        target: String,
        mode: EditMode,
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<String>,
    },
    FileCreate {
        target: String,
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<String>,
    },
    FileDelete {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<String>,
    },
    Command {
        argv: Vec<String>,
        timeout_secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<String>,
    },
}

impl FixStep {
    /// Shape check required at template load (spec §3 `FixTemplate`
    /// invariant: "every `FixStep` passes its own shape check").
    pub fn validate_shape(&self) -> Result<(), String> {
        match self {
            FixStep::FileEdit { target, .. }
            | FixStep::FileCreate { target, .. }
            | FixStep::FileDelete { target, .. } => {
                if target.trim().is_empty() {
                    return Err("file step target must not be empty".to_string());
                }
                if target.starts_with('/') || target.contains("..") {
                    return Err(format!("file step target '{target}' must be a normalized relative path inside the project root"));
                }
                Ok(())
            }
            FixStep::Command { argv, .. } => {
                if argv.is_empty() {
                    return Err("command step argv must not be empty".to_string());
                }
                Ok(())
            }
        }
    }

    pub fn target_path(&self) -> Option<&str> {
        match self {
            FixStep::FileEdit { target, .. }
            | FixStep::FileCreate { target, .. }
            | FixStep::FileDelete { target, .. } => Some(target),
            FixStep::Command { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub applicable_pattern_ids: Vec<String>,
    pub steps: Vec<FixStep>,
    pub risk: Risk,
    pub estimated_wall_clock: String,
    pub success_rate: f64,
    pub prerequisites: Vec<String>,
    pub validation_steps: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl FixTemplate {
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("template id must not be empty".to_string());
        }
        for (idx, step) in self.steps.iter().enumerate() {
            step.validate_shape()
                .map_err(|e| format!("template {} step {idx}: {e}", self.id))?;
        }
        Ok(())
    }
}

/// A template instantiated against a specific match, captures resolved
/// (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub pattern_id: String,
    pub template_id: String,
    pub steps: Vec<FixStep>,
    pub risk: Risk,
    pub estimated_wall_clock: String,
    pub confidence: f64,
    pub auto_applicable: bool,
    /// Carried over from the template's global validation sequence, run
    /// after every step's own `validation` predicate (spec §4.10 step 4).
    pub validation_steps: Vec<String>,
}
