//! Generic readers-writer store with a monotonic version counter.
//!
//! Both the pattern store (C5) and the fix template store (C7) need
//! identical semantics: writers take an exclusive lock and bump a
//! version; readers take a consistent snapshot for the lifetime of
//! their request (spec §4.5/§4.7/§5). Factored out once rather than
//! duplicated between the two stores.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A snapshot readers can hold for the duration of a request without
/// blocking writers, and without the writer blocking on them either —
/// an `Arc` clone of the data as of the moment the snapshot was taken.
pub struct Snapshot<T> {
    pub data: Arc<T>,
    pub version: u64,
}

pub struct VersionedStore<T> {
    inner: RwLock<Arc<T>>,
    version: AtomicU64,
}

impl<T> VersionedStore<T> {
    pub fn new(initial: T) -> Self {
        VersionedStore {
            inner: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Take an immutable snapshot. Cheap: one `Arc` clone under a brief
    /// read lock.
    pub fn snapshot(&self) -> Snapshot<T> {
        let guard = self.inner.read().expect("versioned store poisoned");
        Snapshot {
            data: Arc::clone(&guard),
            version: self.version(),
        }
    }

    /// Replace the stored value under the exclusive write lock and bump
    /// the version. `mutator` receives the current value and returns
    /// the new one; it should clone-and-modify rather than mutate in
    /// place if `T` doesn't support cheap in-place mutation.
    pub fn write<F>(&self, mutator: F)
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.inner.write().expect("versioned store poisoned");
        let new_value = mutator(&guard);
        *guard = Arc::new(new_value);
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}
