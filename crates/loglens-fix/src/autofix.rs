//! C10 Auto Fixer (spec §4.10).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use loglens_domain::error::{LoglensError, Result};
use loglens_domain::model::{EditMode, FixResult, FixStep, FixSuggestion};

use crate::lock::ProjectLock;
use crate::snapshot::SnapshotManager;

/// Paths beneath these roots may never be mutated by a fix, regardless
/// of the project root (spec §4.10: `.git/`, `/etc/`, `~/.ssh/`, or
/// outside project root). Matched by path component, not substring, so
/// `.github/workflows/ci.yml` is not mistaken for `.git/`.
fn is_denied_path(project_root: &Path, relative: &Path) -> bool {
    if relative.is_absolute() {
        return true;
    }
    if relative.components().any(|c| c.as_os_str() == "..") {
        return true;
    }
    if relative
        .components()
        .any(|c| matches!(c.as_os_str().to_str(), Some(".git") | Some(".ssh")))
    {
        return true;
    }
    project_root.join(relative).starts_with("/etc")
}

fn target_paths(suggestion: &FixSuggestion) -> Vec<PathBuf> {
    suggestion
        .steps
        .iter()
        .filter_map(|s| s.target_path())
        .map(PathBuf::from)
        .collect()
}

async fn apply_file_step(project_root: &Path, step: &FixStep) -> Result<()> {
    match step {
        FixStep::FileEdit { target, mode, payload, .. } => {
            let path = project_root.join(target);
            let existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            let new_contents = match mode {
                EditMode::Append => format!("{existing}{payload}"),
                EditMode::Prepend => format!("{payload}{existing}"),
                EditMode::Replace => payload.clone(),
                EditMode::RegexSubstitute => {
                    // `payload` is `pattern\x00replacement`.
                    let mut parts = payload.splitn(2, '\u{0}');
                    let pattern = parts.next().unwrap_or_default();
                    let replacement = parts.next().unwrap_or_default();
                    let re = regex::Regex::new(pattern).map_err(|e| {
                        LoglensError::validation(format!("invalid regex_substitute pattern: {e}"))
                    })?;
                    re.replace_all(&existing, replacement).into_owned()
                }
            };
            atomic_write(&path, new_contents.as_bytes()).await
        }
        FixStep::FileCreate { target, payload, .. } => {
            let path = project_root.join(target);
            atomic_write(&path, payload.as_bytes()).await
        }
        FixStep::FileDelete { target, .. } => {
            let path = project_root.join(target);
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| LoglensError::io("deleting file during fix", e))?;
            }
            Ok(())
        }
        FixStep::Command { .. } => unreachable!("command steps use apply_command_step"),
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| LoglensError::io("creating parent directory", e))?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("fix")
    ));
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| LoglensError::io("creating temp file", e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| LoglensError::io("writing temp file", e))?;
    file.sync_all()
        .await
        .map_err(|e| LoglensError::io("fsyncing temp file", e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| LoglensError::io("renaming temp file into place", e))?;
    Ok(())
}

async fn apply_command_step(
    argv: &[String],
    timeout: Duration,
    project_root: &Path,
) -> Result<String> {
    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .current_dir(project_root)
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| LoglensError::io("spawning fix command", e))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| LoglensError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| LoglensError::io("waiting for fix command", e))?;

    if !output.status.success() {
        return Err(LoglensError::External {
            message: format!(
                "command {:?} exited with {:?}: {}",
                argv,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// The `validation` predicate carried by a step, if any (spec §4.10
/// step 4).
fn step_validation(step: &FixStep) -> Option<&str> {
    match step {
        FixStep::FileEdit { validation, .. }
        | FixStep::FileCreate { validation, .. }
        | FixStep::FileDelete { validation, .. }
        | FixStep::Command { validation, .. } => validation.as_deref(),
    }
}

/// Evaluate one step's `validation` predicate against the post-apply
/// filesystem (and, for command steps, the captured stdout). Predicate
/// grammar: `exists`, `absent`, `contains:<needle>`,
/// `not_contains:<needle>` against the step's own target; or
/// `stdout_contains:<needle>` against a command step's stdout.
async fn evaluate_step_predicate(
    project_root: &Path,
    step: &FixStep,
    predicate: &str,
    stdout: Option<&str>,
) -> Result<bool> {
    if let Some(needle) = predicate.strip_prefix("stdout_contains:") {
        return Ok(stdout.unwrap_or_default().contains(needle));
    }

    let Some(target) = step.target_path() else {
        return Err(LoglensError::validation(format!(
            "validation predicate '{predicate}' requires a file target"
        )));
    };
    let path = project_root.join(target);

    match predicate {
        "exists" => Ok(path.exists()),
        "absent" => Ok(!path.exists()),
        _ => {
            if let Some(needle) = predicate.strip_prefix("contains:") {
                let text = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                Ok(text.contains(needle))
            } else if let Some(needle) = predicate.strip_prefix("not_contains:") {
                let text = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                Ok(!text.contains(needle))
            } else {
                Err(LoglensError::validation(format!(
                    "unrecognized validation predicate '{predicate}'"
                )))
            }
        }
    }
}

/// Evaluate one entry of a template's global `validation_steps` (spec
/// §4.10 step 4), each scoped to an explicit path: `file_exists:<path>`,
/// `file_absent:<path>`, `file_contains:<path>:<needle>`,
/// `file_not_contains:<path>:<needle>`.
async fn evaluate_global_predicate(project_root: &Path, predicate: &str) -> Result<bool> {
    let mut parts = predicate.splitn(3, ':');
    let kind = parts.next().unwrap_or_default();
    let path = parts
        .next()
        .ok_or_else(|| LoglensError::validation(format!("malformed validation step '{predicate}'")))?;
    let full_path = project_root.join(path);

    match kind {
        "file_exists" => Ok(full_path.exists()),
        "file_absent" => Ok(!full_path.exists()),
        "file_contains" | "file_not_contains" => {
            let needle = parts
                .next()
                .ok_or_else(|| LoglensError::validation(format!("malformed validation step '{predicate}'")))?;
            let text = tokio::fs::read_to_string(&full_path).await.unwrap_or_default();
            let contains = text.contains(needle);
            Ok(if kind == "file_contains" { contains } else { !contains })
        }
        _ => Err(LoglensError::validation(format!(
            "unrecognized validation step '{predicate}'"
        ))),
    }
}

pub struct AutoFixer {
    pub project_root: PathBuf,
    pub cache_root: PathBuf,
    pub command_timeout: Duration,
    pub lock_retry_window: Duration,
    pub command_allowlist: HashSet<String>,
}

impl AutoFixer {
    /// Apply `suggestion` atomically: snapshot, apply in order, verify,
    /// and roll back on any failure (spec §4.10).
    ///
    /// `explicit_approval` models the caller's interactive-yes or
    /// auto-apply-low-risk flag. If the suggestion isn't
    /// `auto_applicable` and no explicit approval was given, this
    /// returns a `policy` error with no side effects (spec §8 boundary
    /// behavior).
    pub async fn apply(&self, suggestion: &FixSuggestion, explicit_approval: bool) -> Result<FixResult> {
        if !suggestion.auto_applicable && !explicit_approval {
            return Err(LoglensError::policy(
                "fix suggestion is not auto-applicable and was not explicitly approved",
            ));
        }

        // Preflight: re-validate every step against the current
        // filesystem and the command allow-list.
        for step in &suggestion.steps {
            match step {
                FixStep::Command { argv, .. } => {
                    if argv.is_empty() || !self.command_allowlist.contains(&argv[0]) {
                        return Err(LoglensError::policy(format!(
                            "command '{}' is not on the allow-list",
                            argv.first().cloned().unwrap_or_default()
                        )));
                    }
                }
                FixStep::FileEdit { target, .. }
                | FixStep::FileCreate { target, .. }
                | FixStep::FileDelete { target, .. } => {
                    if is_denied_path(&self.project_root, Path::new(target)) {
                        return Err(LoglensError::policy(format!(
                            "path '{target}' is outside the project root or denied"
                        )));
                    }
                }
            }
        }

        let _lock = ProjectLock::acquire(&self.project_root, self.lock_retry_window)?;

        let manager = SnapshotManager::new(&self.cache_root);
        let absolute_targets: Vec<PathBuf> = target_paths(suggestion)
            .into_iter()
            .map(|p| self.project_root.join(p))
            .collect();
        let snapshot = manager.create(&absolute_targets, &format!("pre-apply for {}", suggestion.id))?;

        let mut applied_steps = Vec::new();
        let mut step_stdout = Vec::new();
        let mut apply_error: Option<String> = None;

        for step in &suggestion.steps {
            info!(step = ?step, "applying fix step");
            let result = match step {
                FixStep::Command { argv, timeout_secs, .. } => {
                    apply_command_step(argv, Duration::from_secs(*timeout_secs).min(self.command_timeout), &self.project_root).await
                }
                other => apply_file_step(&self.project_root, other).await.map(|()| String::new()),
            };
            match result {
                Ok(stdout) => {
                    applied_steps.push(step.clone());
                    step_stdout.push(stdout);
                }
                Err(e) => {
                    apply_error = Some(e.to_string());
                    break;
                }
            }
        }

        let mut verification_passed = apply_error.is_none();

        if verification_passed {
            for (step, stdout) in applied_steps.iter().zip(step_stdout.iter()) {
                let Some(predicate) = step_validation(step) else {
                    continue;
                };
                match evaluate_step_predicate(&self.project_root, step, predicate, Some(stdout)).await {
                    Ok(true) => {}
                    Ok(false) => {
                        apply_error = Some(format!("step validation predicate '{predicate}' failed"));
                        verification_passed = false;
                        break;
                    }
                    Err(e) => {
                        apply_error = Some(e.to_string());
                        verification_passed = false;
                        break;
                    }
                }
            }
        }

        if verification_passed {
            for predicate in &suggestion.validation_steps {
                match evaluate_global_predicate(&self.project_root, predicate).await {
                    Ok(true) => {}
                    Ok(false) => {
                        apply_error = Some(format!("validation step '{predicate}' failed"));
                        verification_passed = false;
                        break;
                    }
                    Err(e) => {
                        apply_error = Some(e.to_string());
                        verification_passed = false;
                        break;
                    }
                }
            }
        }

        if verification_passed {
            info!(snapshot_id = %snapshot.id, "fix applied and verified");
            return Ok(FixResult {
                success: true,
                applied_steps,
                snapshot_id: Some(snapshot.id),
                error: None,
                verification_passed: true,
                rollback_available: true,
            });
        }

        warn!(error = ?apply_error, "fix application failed, rolling back");
        match manager.restore(&snapshot) {
            Ok(()) => {
                let restored_ok = manager.verify(&snapshot);
                Ok(FixResult {
                    success: false,
                    applied_steps,
                    snapshot_id: Some(snapshot.id),
                    error: apply_error,
                    verification_passed: false,
                    rollback_available: restored_ok,
                })
            }
            Err(e) => {
                error!(error = %e, "rollback failed, operator attention required");
                Err(LoglensError::RollbackFailed {
                    message: format!("rollback failed after apply error: {e}"),
                    snapshot_path: Some(self.cache_root.join("snapshots").join(&snapshot.id).to_string_lossy().into_owned()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglens_domain::model::Risk;

    fn make_fixer(project_root: &Path, cache_root: &Path, allow: &[&str]) -> AutoFixer {
        AutoFixer {
            project_root: project_root.to_path_buf(),
            cache_root: cache_root.to_path_buf(),
            command_timeout: Duration::from_secs(5),
            lock_retry_window: Duration::from_secs(2),
            command_allowlist: allow.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn policy_denies_without_approval_and_has_no_side_effects() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &[]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![FixStep::FileCreate {
                target: "new.txt".into(),
                payload: "hi".into(),
                validation: None,
            }],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.5,
            auto_applicable: false,
            validation_steps: vec![],
        };

        let result = fixer.apply(&suggestion, false).await;
        assert!(result.is_err());
        assert!(!project.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn command_outside_allowlist_denied_at_preflight() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &[]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![FixStep::Command {
                argv: vec!["curl".into(), "http://evil".into()],
                timeout_secs: 5,
                validation: None,
            }],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.9,
            auto_applicable: true,
            validation_steps: vec![],
        };

        let result = fixer.apply(&suggestion, true).await;
        assert!(matches!(result, Err(LoglensError::Policy { .. })));
    }

    #[tokio::test]
    async fn file_create_applies_and_is_rolled_back_on_later_failure() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &["false"]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![
                FixStep::FileCreate {
                    target: "new.txt".into(),
                    payload: "hi".into(),
                    validation: None,
                },
                FixStep::Command {
                    argv: vec!["false".into()],
                    timeout_secs: 5,
                    validation: None,
                },
            ],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.9,
            auto_applicable: true,
            validation_steps: vec![],
        };

        let result = fixer.apply(&suggestion, true).await.unwrap();
        assert!(!result.success);
        assert!(result.rollback_available);
        assert!(!project.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn github_workflow_path_is_not_denied_as_dot_git() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &[]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![FixStep::FileCreate {
                target: ".github/workflows/ci.yml".into(),
                payload: "name: ci\n".into(),
                validation: None,
            }],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.9,
            auto_applicable: true,
            validation_steps: vec![],
        };

        let result = fixer.apply(&suggestion, true).await.unwrap();
        assert!(result.success);
        assert!(project.path().join(".github/workflows/ci.yml").exists());
    }

    #[tokio::test]
    async fn failed_post_apply_validation_rolls_back_a_successful_write() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("a.txt"), "x").unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &[]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![FixStep::FileEdit {
                target: "a.txt".into(),
                mode: EditMode::Replace,
                payload: "y".into(),
                // The write itself succeeds, so only a predicate check
                // can catch that "x" was expected to remain.
                validation: Some("contains:x".into()),
            }],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.9,
            auto_applicable: true,
            validation_steps: vec![],
        };

        let result = fixer.apply(&suggestion, true).await.unwrap();
        assert!(!result.success);
        assert!(result.rollback_available);
        assert_eq!(std::fs::read_to_string(project.path().join("a.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn template_level_validation_step_is_checked_after_file_steps() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fixer = make_fixer(project.path(), cache.path(), &[]);

        let suggestion = FixSuggestion {
            id: "s1".into(),
            title: "t".into(),
            description: "d".into(),
            pattern_id: "p".into(),
            template_id: "t".into(),
            steps: vec![FixStep::FileCreate {
                target: "new.txt".into(),
                payload: "hi".into(),
                validation: None,
            }],
            risk: Risk::Low,
            estimated_wall_clock: "1s".into(),
            confidence: 0.9,
            auto_applicable: true,
            validation_steps: vec!["file_contains:new.txt:bye".into()],
        };

        let result = fixer.apply(&suggestion, true).await.unwrap();
        assert!(!result.success);
        assert!(result.rollback_available);
        assert!(!project.path().join("new.txt").exists());
    }
}
