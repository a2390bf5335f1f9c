//! C13 Response Cache (spec §4.13).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use loglens_domain::model::CacheEntry;

struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Recency order, most-recently-used at the back. Kept separate from
    /// the map so eviction doesn't need to scan every entry's timestamp.
    recency: Vec<String>,
    total_bytes: u64,
}

/// In-process LRU cache with a TTL, keyed by an opaque digest (spec
/// §4.13: the caller is responsible for computing a stable key, e.g.
/// from a failure fingerprint plus provider identity). Guarded by a
/// single mutex; critical sections are short map operations only.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        ResponseCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: Vec::new(),
                total_bytes: 0,
            }),
            max_bytes,
            ttl,
        }
    }

    /// Returns the cached value for `key`, or `None` on miss or expiry.
    /// An entry whose age exceeds the TTL is treated as a miss and
    /// dropped (spec §4.13 eviction rule). A value that fails to parse
    /// back (shouldn't happen, but a corrupt cache should never poison a
    /// request) is likewise treated as a miss and the entry removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        let now = Utc::now();
        let expired = match inner.entries.get(key) {
            Some(entry) => is_expired(entry, now, self.ttl),
            None => return None,
        };
        if expired {
            debug!(key, "cache entry expired");
            remove_entry(&mut inner, key);
            return None;
        }
        let value = {
            let entry = inner.entries.get_mut(key).expect("checked above");
            entry.last_accessed = now;
            entry.value.clone()
        };
        touch_recency(&mut inner, key);
        Some(value)
    }

    /// Inserts or replaces `key`. Evicts least-recently-used entries
    /// until the cache fits within `max_bytes`, including the new entry.
    pub fn put(&self, key: &str, value: Value, size_bytes: u64) {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        let now = Utc::now();
        remove_entry(&mut inner, key);

        while inner.total_bytes + size_bytes > self.max_bytes {
            let Some(victim) = inner.recency.first().cloned() else {
                break;
            };
            remove_entry(&mut inner, &victim);
        }

        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                created_at: now,
                size_bytes,
                last_accessed: now,
            },
        );
        inner.recency.push(key.to_string());
        inner.total_bytes += size_bytes;
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate(&self, prefix: &str) {
        let mut inner = self.inner.lock().expect("response cache poisoned");
        let victims: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in victims {
            remove_entry(&mut inner, &key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("response cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_expired(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = now.signed_duration_since(entry.created_at);
    age.to_std().map(|d| d > ttl).unwrap_or(false)
}

fn remove_entry(inner: &mut Inner, key: &str) {
    if let Some(entry) = inner.entries.remove(key) {
        inner.total_bytes = inner.total_bytes.saturating_sub(entry.size_bytes);
    }
    inner.recency.retain(|k| k != key);
}

fn touch_recency(inner: &mut Inner, key: &str) {
    inner.recency.retain(|k| k != key);
    inner.recency.push(key.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let cache = ResponseCache::new(1_000_000, Duration::from_secs(3600));
        cache.put("k1", json!({"a": 1}), 10);
        assert_eq!(cache.get("k1"), Some(json!({"a": 1})));
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = ResponseCache::new(20, Duration::from_secs(3600));
        cache.put("k1", json!(1), 10);
        cache.put("k2", json!(2), 10);
        // k1 is now LRU; inserting k3 must evict it.
        cache.put("k3", json!(3), 10);
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_some());
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = ResponseCache::new(20, Duration::from_secs(3600));
        cache.put("k1", json!(1), 10);
        cache.put("k2", json!(2), 10);
        cache.get("k1");
        cache.put("k3", json!(3), 10);
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn ttl_expiry_is_treated_as_miss() {
        let cache = ResponseCache::new(1_000_000, Duration::from_millis(0));
        cache.put("k1", json!(1), 10);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_matching_prefix() {
        let cache = ResponseCache::new(1_000_000, Duration::from_secs(3600));
        cache.put("analyze:abc", json!(1), 10);
        cache.put("analyze:def", json!(2), 10);
        cache.put("fix:abc", json!(3), 10);
        cache.invalidate("analyze:");
        assert!(cache.get("analyze:abc").is_none());
        assert!(cache.get("analyze:def").is_none());
        assert!(cache.get("fix:abc").is_some());
    }
}
