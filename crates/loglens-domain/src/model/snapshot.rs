//! `Snapshot`, `SnapshotEntry`, and `FixResult` (spec §3, §4.9, §6.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::template::FixStep;

/// Record of one file's state at snapshot time. A `None` sha256 marks a
/// tombstone: the path did not exist, so restoring deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub original_path: String,
    pub stored_index: u32,
    pub sha256: Option<String>,
    pub mode: Option<u32>,
    pub size: u64,
}

impl SnapshotEntry {
    pub fn is_tombstone(&self) -> bool {
        self.sha256.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<SnapshotEntry>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResult {
    pub success: bool,
    pub applied_steps: Vec<FixStep>,
    pub snapshot_id: Option<String>,
    pub error: Option<String>,
    pub verification_passed: bool,
    pub rollback_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_entry_has_no_sha() {
        let e = SnapshotEntry {
            original_path: "new_file.txt".into(),
            stored_index: 0,
            sha256: None,
            mode: None,
            size: 0,
        };
        assert!(e.is_tombstone());
    }
}
