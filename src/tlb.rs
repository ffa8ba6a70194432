use crate::block::ProcessId;
use linked_hash_map::LinkedHashMap;
use log::debug;
use serde::{Deserialize, Serialize};

/// A cached translation. `last_used` is a logical timestamp from the cache's own clock, reported
/// to front ends; eviction follows the map's recency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlbEntry {
    pub vpn: u64,
    pub ppn: u64,
    pub valid: bool,
    pub last_used: u64,
    pub process_id: ProcessId,
}

/// The `TranslationCache` struct is a simple virtualization of the translation look aside buffer
/// commonly found in CPUs. Entries are scoped by process so two processes never see each other's
/// translations, and the least recently used entry is evicted once the buffer is full.
#[derive(Debug, Clone)]
pub struct TranslationCache {
    capacity: usize,
    clock: u64,
    map: LinkedHashMap<(ProcessId, u64), TlbEntry>,
}

impl TranslationCache {
    /// Create and return a new `TranslationCache` holding at most `capacity` entries.
    pub fn build(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            map: LinkedHashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Search the buffer for the page of `process_id`. A hit refreshes the entry's timestamp and
    /// yields the cached frame number; `None` is a miss.
    pub fn lookup(&mut self, process_id: ProcessId, vpn: u64) -> Option<u64> {
        let now = self.tick();
        let entry = self.map.get_refresh(&(process_id, vpn))?;
        entry.last_used = now;
        Some(entry.ppn)
    }

    /// Cache the mapping `vpn -> ppn` for `process_id`. A mapping already present is updated in
    /// place. When the buffer is full the least recently used entry is evicted and returned.
    pub fn insert(&mut self, process_id: ProcessId, vpn: u64, ppn: u64) -> Option<TlbEntry> {
        let now = self.tick();
        if let Some(entry) = self.map.get_refresh(&(process_id, vpn)) {
            entry.ppn = ppn;
            entry.valid = true;
            entry.last_used = now;
            return None;
        }

        let evicted = if self.capacity > 0 && self.map.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        if self.capacity > 0 {
            self.map.insert(
                (process_id, vpn),
                TlbEntry {
                    vpn,
                    ppn,
                    valid: true,
                    last_used: now,
                    process_id,
                },
            );
        }
        evicted
    }

    /// Lookups and updates refresh an entry's position, so the front is the least recently used.
    fn evict_oldest(&mut self) -> Option<TlbEntry> {
        let (_, evicted) = self.map.pop_front()?;
        debug!(
            "tlb evicted page {} of process {}",
            evicted.vpn, evicted.process_id
        );
        Some(evicted)
    }

    /// Remove the cached mapping of `vpn` for `process_id`, if any.
    pub fn invalidate(&mut self, process_id: ProcessId, vpn: u64) -> bool {
        self.map.remove(&(process_id, vpn)).is_some()
    }

    /// Remove the mapping of `vpn` from every process that cached it.
    pub fn invalidate_page(&mut self, vpn: u64) -> usize {
        let holders: Vec<ProcessId> = self
            .map
            .values()
            .filter(|entry| entry.vpn == vpn)
            .map(|entry| entry.process_id)
            .collect();
        holders
            .into_iter()
            .filter(|process_id| self.invalidate(*process_id, vpn))
            .count()
    }

    pub fn invalidate_process(&mut self, process_id: ProcessId) -> usize {
        let keys: Vec<(ProcessId, u64)> = self
            .map
            .keys()
            .filter(|(owner, _)| *owner == process_id)
            .copied()
            .collect();
        keys.iter()
            .filter(|key| self.map.remove(*key).is_some())
            .count()
    }

    /// Entries from least to most recently used.
    pub fn entries(&self) -> Vec<TlbEntry> {
        self.map.values().cloned().collect()
    }
}
