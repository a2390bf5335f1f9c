//! C4 Failure Extractor (spec §4.4).

use std::sync::OnceLock;

use regex::Regex;

use loglens_domain::model::{
    ExecutionResult, Failure, FailureKind, Fingerprint, JobResult, StepResult, WorkflowResult,
};

use crate::signals::{classify_line, is_failure_line};

const DEFAULT_CONTEXT_LINES: usize = 5;
const SYNTHETIC_TAIL_LINES: usize = 20;

fn step_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\[group\](.*)$").unwrap())
}

fn step_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^##\[endgroup\]").unwrap())
}

fn exit_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)process completed with exit code (\d+)").unwrap()
    })
}

fn worker_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\[worker (\d+)\]|##\[group\]\[worker (\d+)\])\s*(.*)$").unwrap())
}

fn file_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\w./\\-]+\.[A-Za-z0-9]+):(\d+)(?::\d+)?").unwrap()
    })
}

/// Strip digits, absolute paths, timestamps, and PIDs so equivalent
/// failures share a fingerprint (spec §3 `Fingerprint` normalization).
fn normalize_message(message: &str) -> String {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    static ABS_PATH: OnceLock<Regex> = OnceLock::new();
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();

    let timestamp_re = TIMESTAMP
        .get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?Z?").unwrap());
    let abs_path_re = ABS_PATH.get_or_init(|| Regex::new(r"(/[\w.\-]+)+").unwrap());
    let digits_re = DIGITS.get_or_init(|| Regex::new(r"\d+").unwrap());

    let step1 = timestamp_re.replace_all(message, "<ts>");
    let step2 = abs_path_re.replace_all(&step1, "<path>");
    digits_re.replace_all(&step2, "N").into_owned()
}

fn file_suffix(message: &str) -> String {
    file_location_re()
        .captures(message)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

struct RawStep {
    name: String,
    lines: Vec<String>,
    exit_code: Option<i32>,
}

/// Split a (possibly multi-worker) log stream into step chunks. When no
/// per-worker prefix markers are present, the whole log is treated as a
/// single stream (spec §4.4 edge case).
fn split_steps(text: &str) -> Vec<RawStep> {
    let lines: Vec<&str> = text.lines().collect();
    let has_worker_markers = lines.iter().any(|l| worker_prefix_re().is_match(l));

    let demuxed: Vec<String> = if has_worker_markers {
        lines
            .iter()
            .map(|l| {
                worker_prefix_re()
                    .captures(l)
                    .map(|c| c.get(3).unwrap().as_str().to_string())
                    .unwrap_or_else(|| l.to_string())
            })
            .collect()
    } else {
        lines.iter().map(|s| s.to_string()).collect()
    };

    let mut steps = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_lines: Vec<String> = Vec::new();
    let mut current_exit: Option<i32> = None;

    for line in demuxed {
        if let Some(caps) = step_start_re().captures(&line) {
            if let Some(name) = current_name.take() {
                steps.push(RawStep {
                    name,
                    lines: std::mem::take(&mut current_lines),
                    exit_code: current_exit.take(),
                });
            }
            current_name = Some(caps[1].trim().to_string());
            continue;
        }
        if step_end_re().is_match(&line) {
            continue;
        }
        if let Some(caps) = exit_code_re().captures(&line) {
            current_exit = caps[1].parse().ok();
        }
        if current_name.is_some() {
            current_lines.push(line);
        }
    }
    if let Some(name) = current_name {
        steps.push(RawStep {
            name,
            lines: current_lines,
            exit_code: current_exit,
        });
    }

    if steps.is_empty() {
        // No step markers at all: treat as a single synthetic step.
        steps.push(RawStep {
            name: "run".to_string(),
            lines: lines.iter().map(|s| s.to_string()).collect(),
            exit_code: None,
        });
    }
    steps
}

fn build_failure(lines: &[String], signal_index: usize, context_lines: usize) -> Failure {
    let message = lines[signal_index].clone();
    let kind = classify_line(&message);
    let before_start = signal_index.saturating_sub(context_lines);
    let context_before = lines[before_start..signal_index].to_vec();
    let after_end = (signal_index + 1 + context_lines).min(lines.len());
    let context_after = lines[signal_index + 1..after_end].to_vec();

    let location = file_location_re().captures(&message);
    let file_path = location.as_ref().map(|c| c[1].to_string());
    let line_number = location.and_then(|c| c[2].parse().ok());

    let normalized = normalize_message(&message);
    let suffix = file_suffix(&message);
    let fingerprint = Fingerprint::compute(&normalized, kind, &suffix);

    Failure {
        kind,
        message,
        file_path,
        line_number,
        context_before,
        context_after,
        stack_trace: None,
        fingerprint,
        occurrence_count: 1,
    }
}

/// Collapse failures that share a fingerprint within one step into a
/// single `Failure` with an occurrence counter (spec §4.4 edge case).
fn collapse_duplicates(failures: Vec<Failure>) -> Vec<Failure> {
    let mut out: Vec<Failure> = Vec::new();
    for failure in failures {
        if let Some(existing) = out
            .iter_mut()
            .find(|f| f.fingerprint == failure.fingerprint)
        {
            existing.occurrence_count += 1;
        } else {
            out.push(failure);
        }
    }
    out
}

fn extract_step(raw: &RawStep, context_lines: usize) -> StepResult {
    let success = raw.exit_code.unwrap_or(0) == 0;

    let mut failures = Vec::new();
    for (i, line) in raw.lines.iter().enumerate() {
        if is_failure_line(line) {
            failures.push(build_failure(&raw.lines, i, context_lines));
        }
    }
    failures = collapse_duplicates(failures);

    if !success && failures.is_empty() {
        // Synthetic unknown failure: no detected signal but non-zero
        // exit (spec §4.4).
        let tail_start = raw.lines.len().saturating_sub(SYNTHETIC_TAIL_LINES);
        let tail = raw.lines[tail_start..].to_vec();
        let message = format!("step '{}' failed with no detected signal", raw.name);
        let normalized = normalize_message(&message);
        let fingerprint = Fingerprint::compute(&normalized, FailureKind::Unknown, &raw.name);
        failures.push(Failure {
            kind: FailureKind::Unknown,
            message,
            file_path: None,
            line_number: None,
            context_before: Vec::new(),
            context_after: tail,
            stack_trace: None,
            fingerprint,
            occurrence_count: 1,
        });
    }

    let step_success = success && failures.is_empty();
    StepResult {
        name: raw.name.clone(),
        success: step_success,
        failures,
        duration_ms: 0,
        exit_code: raw.exit_code,
    }
}

/// Parse sanitized (optionally compressed) log text into a structured
/// `ExecutionResult`. Parsing is best-effort: malformed sections never
/// fail the overall extraction (spec §4.4).
pub fn extract(
    log_text: &str,
    workflow_name: &str,
    job_name: &str,
    context_lines: usize,
) -> ExecutionResult {
    let context_lines = if context_lines == 0 {
        DEFAULT_CONTEXT_LINES
    } else {
        context_lines
    };

    let raw_steps = split_steps(log_text);
    let steps: Vec<StepResult> = raw_steps
        .iter()
        .map(|raw| extract_step(raw, context_lines))
        .collect();

    let job_success = steps.iter().all(|s| s.success);
    let job = JobResult {
        name: job_name.to_string(),
        success: job_success,
        steps,
    };

    let workflow = WorkflowResult {
        name: workflow_name.to_string(),
        success: job.success,
        jobs: vec![job],
    };

    let duration_ms = 0;
    ExecutionResult::new(vec![workflow], duration_ms, log_text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_permission_denied_is_extracted() {
        let log = "##[group]Run docker build\npermission denied while trying to connect to the Docker daemon socket\nProcess completed with exit code 1.\n##[endgroup]";
        let result = extract(log, "ci", "build", 5);
        let failures = result.all_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Permission);
        assert!(failures[0].message.contains("permission denied"));
    }

    #[test]
    fn python_module_not_found_is_extracted() {
        let log = "##[group]Run pytest\nModuleNotFoundError: No module named 'requests'\nProcess completed with exit code 1.\n##[endgroup]";
        let result = extract(log, "ci", "test", 5);
        let failures = result.all_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Dependency);
    }

    #[test]
    fn no_signal_but_nonzero_exit_yields_unknown_failure() {
        let log = "##[group]Run flaky\nsome innocuous output\nProcess completed with exit code 2.\n##[endgroup]";
        let result = extract(log, "ci", "job", 5);
        let failures = result.all_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Unknown);
    }

    #[test]
    fn single_stream_used_when_no_worker_markers() {
        let log = "line one\nerror: build failed\nline three";
        let result = extract(log, "ci", "job", 5);
        assert!(!result.all_failures().is_empty());
    }

    #[test]
    fn repeated_similar_failures_collapse_with_counter() {
        let log = "##[group]Run suite\nerror: timeout in test_a\nerror: timeout in test_a\nerror: timeout in test_a\nProcess completed with exit code 1.\n##[endgroup]";
        let result = extract(log, "ci", "job", 5);
        let failures = result.all_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].occurrence_count, 3);
    }

    #[test]
    fn context_window_contains_signal_line() {
        let log = "##[group]Run job\nbefore1\nbefore2\nerror: boom\nafter1\nafter2\nProcess completed with exit code 1.\n##[endgroup]";
        let result = extract(log, "ci", "job", 2);
        let failures = result.all_failures();
        assert!(failures[0].context_before.contains(&"before2".to_string()));
        assert!(failures[0].context_after.contains(&"after1".to_string()));
    }
}
