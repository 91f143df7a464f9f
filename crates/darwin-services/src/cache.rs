//! Result cache — bounded LRU mapping a request fingerprint to a
//! previously-computed certitude, shared across all tasks of a filter
//! (§4.2).
//!
//! Unlike the teacher's content-addressed disk cache, this is a pure
//! in-memory structure: Darwin's cache holds small integers, not payloads,
//! and is bounded by entry count rather than bytes.

use std::collections::HashMap;
use std::sync::Mutex;

/// A 64-bit non-cryptographic fingerprint over classifier-defined input
/// material (§3). Computed with xxhash, matching the original's
/// `xxh::hash64_t`.
pub fn fingerprint(data: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(data)
}

struct Entry {
    certitude: u32,
    prev: Option<u64>,
    next: Option<u64>,
}

/// A single mutex guards both lookup and store, matching the spec's
/// "single-writer or multi-reader within one critical section" guarantee.
/// Capacity 0 disables the cache entirely.
pub struct ResultCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    map: HashMap<u64, Entry>,
    head: Option<u64>, // most recently used
    tail: Option<u64>, // least recently used
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                head: None,
                tail: None,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }

    /// O(1) expected lookup; promotes the entry to most-recently-used on
    /// hit.
    pub fn lookup(&self, fp: u64) -> Option<u32> {
        if !self.enabled() {
            return None;
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner.map.contains_key(&fp) {
            return None;
        }
        inner.detach(fp);
        inner.push_front(fp);
        inner.map.get(&fp).map(|e| e.certitude)
    }

    /// O(1) amortised store; evicts the least-recently-used entry if the
    /// cache is at capacity.
    pub fn store(&self, fp: u64, certitude: u32) {
        if !self.enabled() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();

        if inner.map.contains_key(&fp) {
            inner.detach(fp);
            inner.map.get_mut(&fp).unwrap().certitude = certitude;
            inner.push_front(fp);
            return;
        }

        if inner.map.len() >= self.capacity {
            if let Some(lru) = inner.tail {
                inner.detach(lru);
                inner.map.remove(&lru);
            }
        }

        inner.map.insert(
            fp,
            Entry {
                certitude,
                prev: None,
                next: None,
            },
        );
        inner.push_front(fp);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn detach(&mut self, key: u64) {
        let (prev, next) = match self.map.get(&key) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => self.map.get_mut(&p).unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.map.get_mut(&n).unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, key: u64) {
        let old_head = self.head;
        if let Some(e) = self.map.get_mut(&key) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            self.map.get_mut(&h).unwrap().prev = Some(key);
        }
        self.head = Some(key);
        if self.tail.is_none() {
            self.tail = Some(key);
        }
    }
}
