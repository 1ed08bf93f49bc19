use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Entries expire `ttl` after they were stored. An expired entry is
/// dropped when its key is read, and every insert sweeps out the rest.
pub(crate) struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let fresh = {
            let entry = self.entries.get(key)?;
            let (stored_at, value) = entry.value();
            (stored_at.elapsed() < self.ttl).then(|| value.clone())
        };
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        let ttl = self.ttl;
        self.entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        self.entries.insert(key, (Instant::now(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("posts", 3);
        assert_eq!(cache.get(&"posts"), Some(3));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"posts"), None);
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn inserts_sweep_out_expired_keys() {
        let cache = TtlCache::new(Duration::from_millis(1));
        for page in 0..10_000 {
            cache.insert(page, "stale");
        }
        std::thread::sleep(Duration::from_millis(5));

        cache.insert(10_000, "fresh");
        assert_eq!(cache.entries.len(), 1);
    }
}
