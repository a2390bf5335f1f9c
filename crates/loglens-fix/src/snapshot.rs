//! C9 Snapshot Manager (spec §4.9, §6.3).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use loglens_domain::error::{LoglensError, Result};
use loglens_domain::model::{Snapshot, SnapshotEntry};

use crate::id::new_sortable_id;

#[derive(Serialize, Deserialize)]
struct Manifest {
    id: String,
    created_at: chrono::DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
    description: String,
}

pub struct SnapshotManager {
    cache_root: PathBuf,
}

impl SnapshotManager {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        SnapshotManager {
            cache_root: cache_root.into(),
        }
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.cache_root.join("snapshots").join(id)
    }

    /// Record each file's bytes, SHA-256, and mode. Nonexistent paths
    /// get a tombstone entry so `restore` can delete a file a fix later
    /// creates (spec §4.9).
    pub fn create(&self, file_set: &[PathBuf], description: &str) -> Result<Snapshot> {
        let id = new_sortable_id();
        let dir = self.snapshot_dir(&id);
        let files_dir = dir.join("files");
        fs::create_dir_all(&files_dir).map_err(|e| LoglensError::io("creating snapshot dir", e))?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| LoglensError::io("setting snapshot dir permissions", e))?;

        let mut entries = Vec::with_capacity(file_set.len());
        for (index, path) in file_set.iter().enumerate() {
            let original_path = path.to_string_lossy().into_owned();
            if !path.exists() {
                entries.push(SnapshotEntry {
                    original_path,
                    stored_index: index as u32,
                    sha256: None,
                    mode: None,
                    size: 0,
                });
                continue;
            }
            let bytes = fs::read(path).map_err(|e| LoglensError::io("reading file for snapshot", e))?;
            let metadata = fs::metadata(path).map_err(|e| LoglensError::io("reading file metadata", e))?;
            let mode = metadata.permissions().mode();
            let sha256 = loglens_domain::digest::digest_bytes(&bytes);

            let stored_path = files_dir.join(index.to_string());
            fs::write(&stored_path, &bytes).map_err(|e| LoglensError::io("writing snapshot file", e))?;
            fs::set_permissions(&stored_path, fs::Permissions::from_mode(0o600))
                .map_err(|e| LoglensError::io("setting snapshot file permissions", e))?;

            entries.push(SnapshotEntry {
                original_path,
                stored_index: index as u32,
                sha256: Some(sha256),
                mode: Some(mode),
                size: bytes.len() as u64,
            });
        }

        let snapshot = Snapshot {
            id: id.clone(),
            created_at: Utc::now(),
            entries,
            description: description.to_string(),
        };

        let manifest = Manifest {
            id: snapshot.id.clone(),
            created_at: snapshot.created_at,
            entries: snapshot.entries.clone(),
            description: snapshot.description.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| LoglensError::Parse {
            message: e.to_string(),
        })?;
        fs::write(dir.join("manifest.json"), json).map_err(|e| LoglensError::io("writing manifest", e))?;

        Ok(snapshot)
    }

    pub fn load_manifest(&self, id: &str) -> Result<Snapshot> {
        let path = self.snapshot_dir(id).join("manifest.json");
        let text = fs::read_to_string(&path).map_err(|e| LoglensError::io("reading manifest", e))?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| LoglensError::Parse {
            message: e.to_string(),
        })?;
        Ok(Snapshot {
            id: manifest.id,
            created_at: manifest.created_at,
            entries: manifest.entries,
            description: manifest.description,
        })
    }

    /// Verify every stored file still matches its recorded digest.
    pub fn verify(&self, snapshot: &Snapshot) -> bool {
        let files_dir = self.snapshot_dir(&snapshot.id).join("files");
        snapshot.entries.iter().all(|entry| {
            if entry.is_tombstone() {
                return true;
            }
            let stored_path = files_dir.join(entry.stored_index.to_string());
            match fs::read(&stored_path) {
                Ok(bytes) => Some(loglens_domain::digest::digest_bytes(&bytes)) == entry.sha256,
                Err(_) => false,
            }
        })
    }

    /// Restore every recorded path to its exact original bytes and mode.
    /// A tombstone entry deletes the path if it now exists (spec §4.9
    /// invariant).
    pub fn restore(&self, snapshot: &Snapshot) -> Result<()> {
        let files_dir = self.snapshot_dir(&snapshot.id).join("files");
        for entry in &snapshot.entries {
            let target = Path::new(&entry.original_path);
            if entry.is_tombstone() {
                if target.exists() {
                    fs::remove_file(target).map_err(|e| LoglensError::io("removing file on restore", e))?;
                }
                continue;
            }
            let stored_path = files_dir.join(entry.stored_index.to_string());
            let bytes = fs::read(&stored_path).map_err(|e| LoglensError::io("reading stored snapshot file", e))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| LoglensError::io("recreating parent dir", e))?;
            }
            fs::write(target, &bytes).map_err(|e| LoglensError::io("restoring file contents", e))?;
            if let Some(mode) = entry.mode {
                fs::set_permissions(target, fs::Permissions::from_mode(mode))
                    .map_err(|e| LoglensError::io("restoring file mode", e))?;
            }
        }
        Ok(())
    }

    /// Delete snapshots older than `retention_secs` unless `referenced`
    /// reports they are still reachable from an un-reclaimed `FixResult`
    /// (spec §4.9).
    pub fn gc(
        &self,
        retention_secs: u64,
        referenced: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>> {
        let snapshots_dir = self.cache_root.join("snapshots");
        if !snapshots_dir.exists() {
            return Ok(Vec::new());
        }
        let cutoff = Utc::now() - chrono::Duration::seconds(retention_secs as i64);
        let mut removed = Vec::new();
        for entry in fs::read_dir(&snapshots_dir).map_err(|e| LoglensError::io("reading snapshots dir", e))? {
            let entry = entry.map_err(|e| LoglensError::io("reading snapshot dir entry", e))?;
            let id = entry.file_name().to_string_lossy().into_owned();
            if referenced(&id) {
                continue;
            }
            let Ok(snapshot) = self.load_manifest(&id) else {
                continue;
            };
            if snapshot.created_at < cutoff {
                fs::remove_dir_all(entry.path()).map_err(|e| LoglensError::io("removing old snapshot", e))?;
                removed.push(id);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_restore_recreates_exact_bytes_and_mode() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let file_path = project.path().join("a.txt");
        fs::write(&file_path, b"x").unwrap();
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644)).unwrap();

        let manager = SnapshotManager::new(cache.path());
        let snapshot = manager.create(&[file_path.clone()], "before fix").unwrap();
        assert!(manager.verify(&snapshot));

        fs::write(&file_path, b"y").unwrap();
        manager.restore(&snapshot).unwrap();

        let restored = fs::read(&file_path).unwrap();
        assert_eq!(restored, b"x");
        let mode = fs::metadata(&file_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn tombstone_entry_deletes_created_file_on_restore() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let missing_path = project.path().join("new.txt");

        let manager = SnapshotManager::new(cache.path());
        let snapshot = manager.create(&[missing_path.clone()], "tombstone test").unwrap();

        fs::write(&missing_path, b"created by fix").unwrap();
        assert!(missing_path.exists());

        manager.restore(&snapshot).unwrap();
        assert!(!missing_path.exists());
    }

    #[test]
    fn verify_detects_corruption() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let file_path = project.path().join("a.txt");
        fs::write(&file_path, b"x").unwrap();

        let manager = SnapshotManager::new(cache.path());
        let snapshot = manager.create(&[file_path.clone()], "d").unwrap();

        let stored = manager
            .snapshot_dir(&snapshot.id)
            .join("files")
            .join("0");
        fs::write(stored, b"corrupted").unwrap();

        assert!(!manager.verify(&snapshot));
    }

    #[test]
    fn gc_respects_referenced_snapshots() {
        let project = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let file_path = project.path().join("a.txt");
        fs::write(&file_path, b"x").unwrap();

        let manager = SnapshotManager::new(cache.path());
        let snapshot = manager.create(&[file_path.clone()], "d").unwrap();

        let removed = manager.gc(0, |id| id == snapshot.id).unwrap();
        assert!(removed.is_empty());

        let removed = manager.gc(0, |_| false).unwrap();
        assert_eq!(removed, vec![snapshot.id]);
    }
}
