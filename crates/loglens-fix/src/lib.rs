//! Fix application: C9 Snapshot Manager, C10 Auto Fixer.

pub mod autofix;
pub mod id;
pub mod lock;
pub mod snapshot;

pub use autofix::AutoFixer;
pub use lock::ProjectLock;
pub use snapshot::SnapshotManager;
