//! Multi-layer cache shared by the detection pipeline and the IoC layer
//!
//! Three levels behind one contract: L1 in-memory LRU, L2 on-disk store,
//! optional L3 remote key-value store. Reads go L1 → L2 → L3 with a
//! promotion policy; writes go through every enabled layer. Concurrent
//! misses on the same key are coalesced to a single fill.

mod disk;
mod memory;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::{NullVoidError, Result};

pub use disk::DiskCache;
pub use memory::MemoryCache;
#[cfg(feature = "remote-cache")]
pub use remote::RedisStore;
pub use remote::{RemoteKv, RemoteLayer};

/// Hits at a lower layer before a value is promoted one layer up.
pub const PROMOTION_THRESHOLD: u32 = 3;

/// Counter snapshot for one cache layer.
///
/// Counters are monotonic within a session; `size` tracks live entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A cache hit with the time the entry has left to live, so promotion into
/// a faster layer cannot extend an entry past its original deadline.
#[derive(Debug, Clone)]
pub struct CacheHit<T> {
    pub value: T,
    pub remaining_ttl: Duration,
}

/// Contract every layer satisfies. An entry past its TTL must be refused on
/// read and counted as a miss.
pub trait CacheLayer<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheHit<T>>;
    fn set(&self, key: &str, value: T, ttl: Duration);
    fn delete(&self, key: &str) -> bool;
    fn clear(&self);
    fn stats(&self) -> CacheStats;
}

enum FillState<T> {
    Pending,
    Done(Option<T>),
}

struct FillSlot<T> {
    state: Mutex<FillState<T>>,
    ready: Condvar,
}

/// The layered cache. `T` must serialize for the disk and remote layers.
pub struct MultiLayerCache<T> {
    l1: MemoryCache<T>,
    l2: Option<DiskCache<T>>,
    l3: Option<Box<dyn CacheLayer<T>>>,
    default_ttl: Duration,
    /// Per-(layer, key) hit counts driving promotion.
    promotion_hits: DashMap<(u8, String), u32>,
    /// In-flight fills, at most one per key.
    fills: DashMap<String, Arc<FillSlot<T>>>,
}

impl<T> MultiLayerCache<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    #[must_use]
    pub fn new(l1_max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            l1: MemoryCache::new(l1_max_entries),
            l2: None,
            l3: None,
            default_ttl,
            promotion_hits: DashMap::new(),
            fills: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_disk(mut self, disk: DiskCache<T>) -> Self {
        self.l2 = Some(disk);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: Box<dyn CacheLayer<T>>) -> Self {
        self.l3 = Some(remote);
        self
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read through the layers, promoting persistent hits upward.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(hit) = self.l1.get(key) {
            return Some(hit.value);
        }

        if let Some(l2) = &self.l2
            && let Some(hit) = l2.get(key)
        {
            if self.bump_promotion(2, key) {
                self.l1.set(key, hit.value.clone(), hit.remaining_ttl);
            }
            return Some(hit.value);
        }

        if let Some(l3) = &self.l3
            && let Some(hit) = l3.get(key)
        {
            if self.bump_promotion(3, key) {
                if let Some(l2) = &self.l2 {
                    l2.set(key, hit.value.clone(), hit.remaining_ttl);
                } else {
                    self.l1.set(key, hit.value.clone(), hit.remaining_ttl);
                }
            }
            return Some(hit.value);
        }

        None
    }

    /// Write-through: every enabled layer receives the value with the
    /// requested TTL.
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        self.l1.set(key, value.clone(), ttl);
        if let Some(l2) = &self.l2 {
            l2.set(key, value.clone(), ttl);
        }
        if let Some(l3) = &self.l3 {
            l3.set(key, value, ttl);
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut deleted = self.l1.delete(key);
        if let Some(l2) = &self.l2 {
            deleted |= l2.delete(key);
        }
        if let Some(l3) = &self.l3 {
            deleted |= l3.delete(key);
        }
        self.promotion_hits.retain(|(_, k), _| k != key);
        deleted
    }

    pub fn clear(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            l2.clear();
        }
        if let Some(l3) = &self.l3 {
            l3.clear();
        }
        self.promotion_hits.clear();
    }

    /// Per-layer stats, L1 first.
    #[must_use]
    pub fn layer_stats(&self) -> Vec<(&'static str, CacheStats)> {
        let mut out = vec![("memory", self.l1.stats())];
        if let Some(l2) = &self.l2 {
            out.push(("disk", l2.stats()));
        }
        if let Some(l3) = &self.l3 {
            out.push(("remote", l3.stats()));
        }
        out
    }

    /// Get the value for `key`, running `fill` on a miss.
    ///
    /// At most one concurrent fill runs per key; all other callers block on
    /// the in-flight fill and share its result. A failed fill caches
    /// nothing, and waiting callers receive a `Cache` error rather than
    /// re-running the fill themselves.
    pub fn get_or_fill(
        &self,
        key: &str,
        ttl: Duration,
        fill: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let slot = Arc::new(FillSlot {
            state: Mutex::new(FillState::Pending),
            ready: Condvar::new(),
        });

        match self.fills.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                // Another thread owns the fill; wait for it to finish.
                let slot = Arc::clone(existing.get());
                drop(existing);
                let mut state = slot.state.lock();
                while matches!(*state, FillState::Pending) {
                    slot.ready.wait(&mut state);
                }
                match &*state {
                    FillState::Done(Some(value)) => Ok(value.clone()),
                    _ => Err(NullVoidError::Cache(format!(
                        "coalesced fill for '{key}' failed"
                    ))),
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&slot));

                // Re-check: a fill may have completed between our miss and
                // claiming the slot.
                if let Some(value) = self.get(key) {
                    let mut state = slot.state.lock();
                    *state = FillState::Done(Some(value.clone()));
                    drop(state);
                    slot.ready.notify_all();
                    self.fills.remove(key);
                    return Ok(value);
                }

                let result = fill();

                if let Ok(value) = &result {
                    self.set(key, value.clone(), ttl);
                }
                let mut state = slot.state.lock();
                *state = FillState::Done(result.as_ref().ok().cloned());
                drop(state);
                slot.ready.notify_all();
                self.fills.remove(key);
                result
            }
        }
    }

    fn bump_promotion(&self, layer: u8, key: &str) -> bool {
        let mut count = self
            .promotion_hits
            .entry((layer, key.to_string()))
            .or_insert(0);
        *count += 1;
        if *count >= PROMOTION_THRESHOLD {
            *count = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MultiLayerCache<String> {
        MultiLayerCache::new(16, Duration::from_secs(60))
    }

    #[test]
    fn test_write_through_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache().with_disk(DiskCache::new(dir.path(), 1 << 20, false).unwrap());

        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        // L1 cleared, value still served from disk.
        cache.l1.clear();
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_promotion_after_threshold_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache().with_disk(DiskCache::new(dir.path(), 1 << 20, false).unwrap());

        cache.set("k", "v".to_string(), Duration::from_secs(60));
        cache.l1.clear();

        for _ in 0..PROMOTION_THRESHOLD {
            assert_eq!(cache.get("k"), Some("v".to_string()));
        }
        // The value is back in L1 now.
        assert!(cache.l1.get("k").is_some());
    }

    #[test]
    fn test_get_or_fill_runs_once_per_key() {
        let cache = Arc::new(cache());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(std::thread::spawn(move || {
                cache
                    .get_or_fill("shared", Duration::from_secs(60), || {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        Ok("filled".to_string())
                    })
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "filled");
        }
        // All concurrent callers coalesced onto at most one fill; stragglers
        // that arrive after completion are served from cache.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_fill_caches_nothing() {
        let cache = cache();
        let result = cache.get_or_fill("bad", Duration::from_secs(60), || {
            Err(NullVoidError::Cache("upstream down".into()))
        });
        assert!(result.is_err());
        assert_eq!(cache.get("bad"), None);
    }

    #[test]
    fn test_delete_removes_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache().with_disk(DiskCache::new(dir.path(), 1 << 20, false).unwrap());
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert!(cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }
}
