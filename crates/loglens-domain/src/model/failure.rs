//! `Failure`, `Fingerprint`, and the `ExecutionResult` tree (spec §3).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of a detected failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    Error,
    Timeout,
    Syntax,
    Dependency,
    Permission,
    Network,
    Unknown,
}

/// Deterministic identity hash of a failure, used for cache keys and
/// unknown-failure grouping. Normalization strips digits, absolute
/// paths, timestamps, and PIDs before hashing (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn compute(normalized_message: &str, kind: FailureKind, file_suffix: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_message.as_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{kind:?}").as_bytes());
        hasher.update([0u8]);
        hasher.update(file_suffix.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One detected failure inside a step. Immutable once produced by the
/// failure extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    pub stack_trace: Option<String>,
    pub fingerprint: Fingerprint,
    /// Number of times an equivalent failure recurred within the same
    /// step and was collapsed into this one (spec §4.4 "occurrence
    /// counter" edge case).
    pub occurrence_count: u32,
}

impl Failure {
    pub fn combined_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.message);
        out.push('\n');
        for line in &self.context_before {
            out.push_str(line);
            out.push('\n');
        }
        for line in &self.context_after {
            out.push_str(line);
            out.push('\n');
        }
        if let Some(trace) = &self.stack_trace {
            out.push_str(trace);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub failures: Vec<Failure>,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub name: String,
    pub success: bool,
    pub steps: Vec<StepResult>,
}

impl JobResult {
    pub fn recompute_success(&mut self) {
        self.success = self.steps.iter().all(|s| s.success);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub name: String,
    pub success: bool,
    pub jobs: Vec<JobResult>,
}

impl WorkflowResult {
    pub fn recompute_success(&mut self) {
        self.success = self.jobs.iter().all(|j| j.success);
    }
}

/// Root of a parsed run. `duration_ms` must be at least 90% of the sum
/// of step durations (spec §3 invariant — parsing slack tolerance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub workflows: Vec<WorkflowResult>,
    pub success: bool,
    pub duration_ms: u64,
    pub log_text: String,
}

impl ExecutionResult {
    pub fn new(workflows: Vec<WorkflowResult>, duration_ms: u64, log_text: String) -> Self {
        let success = workflows.iter().all(|w| w.success);
        ExecutionResult {
            workflows,
            success,
            duration_ms,
            log_text,
        }
    }

    pub fn total_step_duration_ms(&self) -> u64 {
        self.workflows
            .iter()
            .flat_map(|w| &w.jobs)
            .flat_map(|j| &j.steps)
            .map(|s| s.duration_ms)
            .sum()
    }

    /// Validates the §3 duration tolerance invariant.
    pub fn duration_invariant_holds(&self) -> bool {
        let steps_total = self.total_step_duration_ms() as f64;
        self.duration_ms as f64 >= steps_total * 0.9
    }

    pub fn all_failures(&self) -> Vec<&Failure> {
        self.workflows
            .iter()
            .flat_map(|w| &w.jobs)
            .flat_map(|j| &j.steps)
            .flat_map(|s| &s.failures)
            .collect()
    }
}

/// Raw log input plus its origin descriptor (spec §3 `Log`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOrigin {
    pub workflow_name: String,
    pub job_name: String,
    pub step_index: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub bytes: Vec<u8>,
    pub origin: LogOrigin,
}

impl Log {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, success: bool, duration_ms: u64) -> StepResult {
        StepResult {
            name: name.to_string(),
            success,
            failures: Vec::new(),
            duration_ms,
            exit_code: if success { Some(0) } else { Some(1) },
        }
    }

    #[test]
    fn success_is_conjunction_of_children() {
        let mut job = JobResult {
            name: "build".into(),
            success: true,
            steps: vec![step("compile", true, 10), step("test", false, 20)],
        };
        job.recompute_success();
        assert!(!job.success);
    }

    #[test]
    fn execution_result_success_is_and_of_workflows() {
        let wf_ok = WorkflowResult {
            name: "ci".into(),
            success: true,
            jobs: vec![],
        };
        let wf_fail = WorkflowResult {
            name: "release".into(),
            success: false,
            jobs: vec![],
        };
        let result = ExecutionResult::new(vec![wf_ok, wf_fail], 100, String::new());
        assert!(!result.success);
    }

    #[test]
    fn duration_invariant_tolerates_parsing_slack() {
        let job = JobResult {
            name: "build".into(),
            success: true,
            steps: vec![step("a", true, 50), step("b", true, 50)],
        };
        let wf = WorkflowResult {
            name: "ci".into(),
            success: true,
            jobs: vec![job],
        };
        let result = ExecutionResult::new(vec![wf], 95, String::new());
        assert!(result.duration_invariant_holds());
        let result2 = ExecutionResult::new(vec![], 0, String::new());
        let _ = result2.duration_invariant_holds();
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::compute("module not found", FailureKind::Dependency, "app.py");
        let b = Fingerprint::compute("module not found", FailureKind::Dependency, "app.py");
        assert_eq!(a, b);
        let c = Fingerprint::compute("module not found", FailureKind::Dependency, "other.py");
        assert_ne!(a, c);
    }
}
