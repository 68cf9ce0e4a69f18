//! The fingerprint cache.
//!
//! One entry per `(conversation file, view, router id)`. The cache is an
//! optimization hint, never a source of truth: a miss or stale entry only
//! means the client receives more data than strictly necessary. Entries are
//! overwritten unconditionally after every delta computation, and every
//! write runs housekeeping: expired entries are swept, then the least
//! recently used entries are evicted down to capacity.

use crate::diff::Fingerprints;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeltaKey {
    pub file: String,
    pub view: String,
    pub router_id: String,
}

struct Entry {
    fingerprints: Fingerprints,
    last_used: Instant,
}

pub struct DeltaCache {
    entries: Mutex<HashMap<DeltaKey, Entry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for DeltaCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl DeltaCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Fetch the cached fingerprints, refreshing the entry's idle clock.
    pub fn get(&self, key: &DeltaKey) -> Option<Fingerprints> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get_mut(key)?;
        if entry.last_used.elapsed() > self.ttl {
            entries.remove(key);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.fingerprints.clone())
    }

    /// Store fingerprints, replacing any existing entry, then housekeep.
    pub fn put(&self, key: DeltaKey, fingerprints: Fingerprints) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(
            key,
            Entry {
                fingerprints,
                last_used: Instant::now(),
            },
        );

        let before = entries.len();
        entries.retain(|_, e| e.last_used.elapsed() <= self.ttl);
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => entries.remove(&k),
                None => break,
            };
        }
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "delta cache housekeeping");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(file: &str) -> DeltaKey {
        DeltaKey {
            file: file.into(),
            view: "user_view".into(),
            router_id: "r1".into(),
        }
    }

    #[test]
    fn put_then_get() {
        let cache = DeltaCache::default();
        let prints = Fingerprints {
            variables_hash: "abc".into(),
            ..Fingerprints::default()
        };
        cache.put(key("a.json"), prints.clone());
        assert_eq!(cache.get(&key("a.json")), Some(prints));
        assert_eq!(cache.get(&key("b.json")), None);
    }

    #[test]
    fn put_overwrites_unconditionally() {
        let cache = DeltaCache::default();
        let first = Fingerprints {
            variables_hash: "one".into(),
            ..Fingerprints::default()
        };
        let second = Fingerprints {
            variables_hash: "two".into(),
            ..Fingerprints::default()
        };
        cache.put(key("a.json"), first);
        cache.put(key("a.json"), second.clone());
        assert_eq!(cache.get(&key("a.json")), Some(second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = DeltaCache::new(2, DEFAULT_TTL);
        cache.put(key("a.json"), Fingerprints::default());
        cache.put(key("b.json"), Fingerprints::default());
        // Touch a so b becomes the LRU entry.
        cache.get(&key("a.json"));
        cache.put(key("c.json"), Fingerprints::default());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a.json")).is_some());
        assert!(cache.get(&key("b.json")).is_none());
        assert!(cache.get(&key("c.json")).is_some());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = DeltaCache::new(8, Duration::ZERO);
        cache.put(key("a.json"), Fingerprints::default());
        assert_eq!(cache.get(&key("a.json")), None);
    }

    #[test]
    fn distinct_views_are_distinct_entries() {
        let cache = DeltaCache::default();
        let user = key("a.json");
        let assistant = DeltaKey {
            view: "assistant_view".into(),
            ..key("a.json")
        };
        cache.put(user.clone(), Fingerprints::default());
        assert!(cache.get(&user).is_some());
        assert!(cache.get(&assistant).is_none());
    }
}
