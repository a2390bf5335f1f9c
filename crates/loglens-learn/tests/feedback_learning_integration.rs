//! Feedback recorded to disk flows back through the learning engine and
//! updates pattern statistics exactly once per feedback record.

use std::collections::HashSet;
use std::time::Duration;

use loglens_domain::model::UserFeedback;
use loglens_learn::{apply_feedback, FeedbackRecorder};
use loglens_patterns::PatternStore;

fn make_feedback(pattern_id: &str, success: bool) -> UserFeedback {
    UserFeedback {
        id: uuid::Uuid::new_v4(),
        pattern_id: pattern_id.to_string(),
        fix_suggestion_id: None,
        rating: if success { 5 } else { 1 },
        success,
        comment: String::new(),
        timestamp: chrono::Utc::now(),
    }
}

#[test]
fn recorded_feedback_is_read_back_and_applied_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("feedback.jsonl");
    let recorder = FeedbackRecorder::new(&log_path, 1, Duration::from_secs(3600));

    let fb = make_feedback("docker_permission_denied", true);
    recorder.record(&fb).expect("recording should succeed");

    let grouped = recorder.read_grouped_by_pattern().expect("log should read back");
    let for_pattern = grouped.get("docker_permission_denied").expect("pattern group present");
    assert_eq!(for_pattern.len(), 1);

    let store = PatternStore::load(None, None).unwrap();
    let before = store.by_id("docker_permission_denied").unwrap().success_rate;

    let mut processed = HashSet::new();
    let applied = apply_feedback(&store, for_pattern, &mut processed, 0.3).unwrap();
    assert_eq!(applied, 1);
    let after = store.by_id("docker_permission_denied").unwrap().success_rate;
    assert!(after >= before);

    // Re-reading and re-applying the same log must be a no-op: the
    // on-disk log is the only source of truth and callers may replay it.
    let replayed = apply_feedback(&store, for_pattern, &mut processed, 0.3).unwrap();
    assert_eq!(replayed, 0);
}

#[test]
fn invalid_feedback_is_rejected_before_touching_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("feedback.jsonl");
    let recorder = FeedbackRecorder::new(&log_path, 1, Duration::from_secs(3600));

    let mut bad = make_feedback("docker_permission_denied", true);
    bad.rating = 0; // out of the valid 1..=5 range

    assert!(recorder.record(&bad).is_err());
    assert!(!log_path.exists(), "rejected feedback must not be written");
}
