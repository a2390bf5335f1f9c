pub mod failure;
pub mod feedback;
pub mod pattern;
pub mod snapshot;
pub mod template;

pub use failure::{
    ExecutionResult, Failure, FailureKind, Fingerprint, JobResult, Log, LogOrigin, StepResult,
    WorkflowResult,
};
pub use feedback::{CacheEntry, UserFeedback};
pub use pattern::{
    compare_matches, ContextRequirement, Pattern, PatternCategory, PatternMatch, PatternSource,
};
pub use snapshot::{FixResult, Snapshot, SnapshotEntry};
pub use template::{EditMode, FixStep, FixSuggestion, FixTemplate, Risk};
