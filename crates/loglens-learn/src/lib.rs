//! Feedback recording, pattern learning, and response caching: C11,
//! C12, C13.

pub mod cache;
pub mod feedback;
pub mod learning;

pub use cache::ResponseCache;
pub use feedback::FeedbackRecorder;
pub use learning::{apply_feedback, discover_candidates, promote_candidate, PatternCandidate};
