//! In-memory LRU cache layer (L1)
//!
//! Classic LRU: a doubly-linked recency list threaded through a slab of
//! nodes, plus a map from key to slab index. Links are slab indices rather
//! than pointers, so the whole structure stays in safe Rust.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{CacheHit, CacheLayer, CacheStats};

struct Entry<T> {
    key: String,
    value: T,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }

    fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.duration_since(self.created_at))
    }
}

struct Inner<T> {
    slab: Vec<Option<Entry<T>>>,
    free: Vec<usize>,
    map: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    max_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU with per-entry TTL. `get` on an expired entry evicts it and counts a
/// miss; `set` when full evicts the least-recently-used tail.
pub struct MemoryCache<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> MemoryCache<T> {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slab: Vec::new(),
                free: Vec::new(),
                map: HashMap::new(),
                head: None,
                tail: None,
                max_entries: max_entries.max(1),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Number of recorded hits on the entry for `key` (promotion input).
    #[must_use]
    pub fn entry_hits(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock();
        let idx = *inner.map.get(key)?;
        inner.slab[idx].as_ref().map(|e| e.hits)
    }
}

impl<T> Inner<T> {
    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.slab[idx].as_ref().map(|e| (e.prev, e.next)) else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(e) = self.slab[p].as_mut() {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.slab[n].as_mut() {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(e) = self.slab[idx].as_mut() {
            e.prev = None;
            e.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(e) = self.slab[idx].as_mut() {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head
            && let Some(e) = self.slab[h].as_mut()
        {
            e.prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn remove(&mut self, idx: usize) -> Option<Entry<T>> {
        self.detach(idx);
        let entry = self.slab[idx].take()?;
        self.map.remove(&entry.key);
        self.free.push(idx);
        Some(entry)
    }

    fn evict_tail(&mut self) {
        if let Some(tail) = self.tail {
            self.remove(tail);
            self.evictions += 1;
        }
    }

    fn insert(&mut self, entry: Entry<T>) {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slab[idx] = Some(entry);
                idx
            }
            None => {
                self.slab.push(Some(entry));
                self.slab.len() - 1
            }
        };
        let key = self.slab[idx]
            .as_ref()
            .map(|e| e.key.clone())
            .unwrap_or_default();
        self.map.insert(key, idx);
        self.push_front(idx);
    }
}

impl<T: Clone + Send + Sync> CacheLayer<T> for MemoryCache<T> {
    fn get(&self, key: &str) -> Option<CacheHit<T>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let Some(&idx) = inner.map.get(key) else {
            inner.misses += 1;
            return None;
        };

        let expired = inner.slab[idx]
            .as_ref()
            .is_none_or(|entry| entry.is_expired(now));
        if expired {
            inner.remove(idx);
            inner.evictions += 1;
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        inner.detach(idx);
        inner.push_front(idx);
        let entry = inner.slab[idx].as_mut()?;
        entry.hits += 1;
        Some(CacheHit {
            value: entry.value.clone(),
            remaining_ttl: entry.remaining_ttl(now),
        })
    }

    fn set(&self, key: &str, value: T, ttl: Duration) {
        let mut inner = self.inner.lock();

        if let Some(&idx) = inner.map.get(key) {
            inner.remove(idx);
        } else if inner.map.len() >= inner.max_entries {
            inner.evict_tail();
        }

        inner.insert(Entry {
            key: key.to_string(),
            value,
            created_at: Instant::now(),
            ttl,
            hits: 0,
            prev: None,
            next: None,
        });
    }

    fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.map.get(key).copied() {
            Some(idx) => inner.remove(idx).is_some(),
            None => false,
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slab.clear();
        inner.free.clear();
        inner.map.clear();
        inner.head = None;
        inner.tail = None;
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.map.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
