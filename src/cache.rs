//! Lookup Cache
//!
//! In-memory map of key → most recent record seen since boot. Populated on
//! every accepted write and lazily on lookups that fall through to disk.
//!
//! Bounded: once `capacity` keys are held, the least recently used key is
//! evicted. An evicted key is still served correctly by the ingest buffer,
//! the membership filter and the segment scan, only more slowly.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::record::Record;

struct CacheEntry {
    record: Record,
    /// Recency tick; key into `LruState::recency`
    last_used: u64,
    hit_count: u64,
}

struct LruState {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, CacheEntry>,
    /// tick → key, oldest first
    recency: BTreeMap<u64, String>,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_used);
            entry.last_used = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Hit/miss counters
#[derive(Default)]
struct Stats {
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub entries: usize,
}

/// Bounded LRU cache of the latest record per key
pub struct LookupCache {
    state: Mutex<LruState>,
    stats: Stats,
}

impl LookupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                capacity: capacity.max(1),
                tick: 0,
                entries: HashMap::new(),
                recency: BTreeMap::new(),
            }),
            stats: Stats::default(),
        }
    }

    /// Look up a key, counting the hit against that key
    pub fn get(&self, key: &str) -> Option<Record> {
        let mut state = self.state.lock();
        let found = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.hit_count += 1;
                Some(entry.record.clone())
            }
            None => None,
        };

        if found.is_some() {
            state.touch(key);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Insert or replace the record for its key (write path)
    pub fn insert(&self, record: Record) {
        let mut state = self.state.lock();
        self.insert_locked(&mut state, record);
    }

    /// Insert only if the key is not cached yet (lookup path)
    ///
    /// A disk scan can finish after a newer write for the same key was
    /// cached; that newer record must not be overwritten.
    pub fn populate(&self, record: Record) {
        let mut state = self.state.lock();
        if state.entries.contains_key(&record.key) {
            return;
        }
        self.insert_locked(&mut state, record);
    }

    fn insert_locked(&self, state: &mut LruState, record: Record) {
        let tick = state.next_tick();
        let key = record.key.clone();

        let hit_count = match state.entries.remove(&key) {
            Some(old) => {
                state.recency.remove(&old.last_used);
                old.hit_count
            }
            None => 0,
        };

        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                record,
                last_used: tick,
                hit_count,
            },
        );

        let evicted = state.evict_overflow();
        if evicted > 0 {
            self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Number of cache hits recorded for a key
    pub fn hit_count(&self, key: &str) -> u64 {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| e.hit_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
