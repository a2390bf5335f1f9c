//! C11 Feedback Recorder (spec §4.11, §6.4).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use loglens_domain::error::{LoglensError, Result};
use loglens_domain::model::UserFeedback;

struct BatchState {
    pending_since_fsync: u32,
    last_fsync: Instant,
}

pub struct FeedbackRecorder {
    log_path: PathBuf,
    fsync_batch_size: u32,
    fsync_interval: Duration,
    state: Mutex<BatchState>,
}

impl FeedbackRecorder {
    pub fn new(log_path: impl Into<PathBuf>, fsync_batch_size: u32, fsync_interval: Duration) -> Self {
        FeedbackRecorder {
            log_path: log_path.into(),
            fsync_batch_size: fsync_batch_size.max(1),
            fsync_interval,
            state: Mutex::new(BatchState {
                pending_since_fsync: 0,
                last_fsync: Instant::now(),
            }),
        }
    }

    /// Append one JSON line for `feedback`. Durable-fsyncs once every
    /// `fsync_batch_size` entries or `fsync_interval`, whichever first.
    /// A write error is surfaced; there is no in-memory retry queue
    /// (spec §4.11 failure semantics).
    pub fn record(&self, feedback: &UserFeedback) -> Result<()> {
        feedback.validate_shape().map_err(LoglensError::validation)?;

        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LoglensError::io("creating feedback log directory", e))?;
        }

        let line = serde_json::to_string(feedback).map_err(|e| LoglensError::Parse {
            message: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| LoglensError::io("opening feedback log for append", e))?;

        writeln!(file, "{line}").map_err(|e| LoglensError::io("appending feedback line", e))?;

        let mut state = self.state.lock().expect("feedback recorder state poisoned");
        state.pending_since_fsync += 1;
        let should_fsync = state.pending_since_fsync >= self.fsync_batch_size
            || state.last_fsync.elapsed() >= self.fsync_interval;
        if should_fsync {
            file.sync_data().map_err(|e| LoglensError::io("fsyncing feedback log", e))?;
            state.pending_since_fsync = 0;
            state.last_fsync = Instant::now();
        }
        Ok(())
    }

    /// All recorded feedback, grouped by pattern id. Corrupt lines are
    /// skipped (best-effort read view).
    pub fn read_grouped_by_pattern(&self) -> Result<HashMap<String, Vec<UserFeedback>>> {
        read_feedback_log(&self.log_path)
    }
}

pub fn read_feedback_log(path: &Path) -> Result<HashMap<String, Vec<UserFeedback>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| LoglensError::io("reading feedback log", e))?;
    let mut grouped: HashMap<String, Vec<UserFeedback>> = HashMap::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(feedback) = serde_json::from_str::<UserFeedback>(line) {
            grouped.entry(feedback.pattern_id.clone()).or_default().push(feedback);
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(pattern_id: &str) -> UserFeedback {
        UserFeedback {
            id: Uuid::new_v4(),
            pattern_id: pattern_id.to_string(),
            fix_suggestion_id: None,
            rating: 4,
            success: true,
            comment: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn records_are_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("feedback.jsonl");
        let recorder = FeedbackRecorder::new(&log, 1, Duration::from_secs(60));
        recorder.record(&sample("docker_permission_denied")).unwrap();
        recorder.record(&sample("docker_permission_denied")).unwrap();
        recorder.record(&sample("python_module_not_found")).unwrap();

        let grouped = recorder.read_grouped_by_pattern().unwrap();
        assert_eq!(grouped["docker_permission_denied"].len(), 2);
        assert_eq!(grouped["python_module_not_found"].len(), 1);
    }

    #[test]
    fn invalid_rating_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("feedback.jsonl");
        let recorder = FeedbackRecorder::new(&log, 1, Duration::from_secs(60));
        let mut bad = sample("p");
        bad.rating = 9;
        assert!(recorder.record(&bad).is_err());
        assert!(!log.exists());
    }

    #[test]
    fn reading_missing_log_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("does-not-exist.jsonl");
        let grouped = read_feedback_log(&log).unwrap();
        assert!(grouped.is_empty());
    }
}
