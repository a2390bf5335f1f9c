//! `UserFeedback` and `CacheEntry` (spec §3, §4.11, §4.13).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFeedback {
    /// Unique per feedback; used to make C12's statistical updates
    /// idempotent per (pattern, feedback) pair (spec §4.12 invariant).
    pub id: Uuid,
    pub pattern_id: String,
    pub fix_suggestion_id: Option<String>,
    pub rating: u8,
    pub success: bool,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl UserFeedback {
    pub fn validate_shape(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err(format!("rating {} out of [1,5]", self.rating));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub last_accessed: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_out_of_range_is_rejected() {
        let fb = UserFeedback {
            id: Uuid::new_v4(),
            pattern_id: "p".into(),
            fix_suggestion_id: None,
            rating: 7,
            success: true,
            comment: String::new(),
            timestamp: Utc::now(),
        };
        assert!(fb.validate_shape().is_err());
    }
}
