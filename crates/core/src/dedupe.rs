use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded "seen before" set. Entries live until evicted by capacity or, when
/// `ttl_ms` is non-zero, until they expire. A `ttl_ms` of zero never expires.
pub struct DedupeCache<K> {
    ttl_ms: u64,
    cache: LruCache<K, u64>,
}

impl<K> DedupeCache<K>
where
    K: Hash + Eq,
{
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl_ms,
            cache: LruCache::new(capacity),
        }
    }

    /// Returns `true` when `key` is new (and records it), `false` for a repeat.
    pub fn check_and_update(&mut self, key: K, now_ms: u64) -> bool {
        if let Some(expires_at) = self.cache.get_mut(&key) {
            if self.ttl_ms == 0 {
                return false;
            }
            if now_ms <= *expires_at {
                *expires_at = now_ms.saturating_add(self.ttl_ms);
                return false;
            }
        }

        let expires_at = if self.ttl_ms == 0 {
            u64::MAX
        } else {
            now_ms.saturating_add(self.ttl_ms)
        };
        self.cache.put(key, expires_at);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::DedupeCache;

    #[test]
    fn dedupe_blocks_within_ttl() {
        let mut cache = DedupeCache::new(4, 100);
        assert!(cache.check_and_update(42u64, 1_000));
        assert!(!cache.check_and_update(42u64, 1_050));
    }

    #[test]
    fn dedupe_expires_after_ttl() {
        let mut cache = DedupeCache::new(4, 100);
        assert!(cache.check_and_update(7u64, 1_000));
        assert!(cache.check_and_update(7u64, 1_200));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut cache = DedupeCache::new(4, 0);
        assert!(cache.check_and_update(3u64, 1_000));
        assert!(!cache.check_and_update(3u64, u64::MAX - 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oldest_entry_evicted_at_capacity() {
        let mut cache = DedupeCache::new(2, 0);
        assert!(cache.check_and_update(1u64, 0));
        assert!(cache.check_and_update(2u64, 0));
        assert!(cache.check_and_update(3u64, 0));
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
    }
}
