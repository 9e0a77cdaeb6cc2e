//! Per-port value cache.
//!
//! Avoids a register round-trip on repeated reads. Keyed by
//! `(address, length)`, guarded by its own lock independent of the
//! node-map lock — several node maps may share one port and therefore one
//! cache. There is no eviction policy: the cache is small and bounded
//! (one entry per distinct register span actually accessed) and entries
//! persist until a write or an upstream invalidation drops them. An
//! invalid entry is always treated as a miss, never as a fallback value.

use hashbrown::HashMap;
use parking_lot::Mutex;

// ============================================================================
// ValueCache
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    address: u64,
    length: usize,
}

#[derive(Debug)]
struct CacheEntry {
    bytes: Vec<u8>,
    valid: bool,
}

/// Byte-range cache over one port.
#[derive(Debug, Default)]
pub struct ValueCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached bytes for the span, or `None` on miss / invalid entry.
    pub fn lookup(&self, address: u64, length: usize) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        let entry = entries.get(&CacheKey { address, length })?;
        if !entry.valid {
            return None;
        }
        debug_assert_eq!(entry.bytes.len(), length);
        Some(entry.bytes.clone())
    }

    /// Store bytes for the span. `bytes.len()` must equal `length`.
    pub fn update(&self, address: u64, bytes: &[u8]) {
        tracing::trace!(address, length = bytes.len(), "value cache update");
        self.entries.lock().insert(
            CacheKey { address, length: bytes.len() },
            CacheEntry { bytes: bytes.to_vec(), valid: true },
        );
    }

    /// Drop one span. A later `lookup` misses until the next `update`.
    pub fn invalidate(&self, address: u64, length: usize) {
        if let Some(entry) = self.entries.lock().get_mut(&CacheKey { address, length }) {
            entry.valid = false;
        }
    }

    /// Drop every span.
    pub fn invalidate_all(&self) {
        for entry in self.entries.lock().values_mut() {
            entry.valid = false;
        }
    }

    pub fn is_valid(&self, address: u64, length: usize) -> bool {
        self.entries
            .lock()
            .get(&CacheKey { address, length })
            .is_some_and(|e| e.valid)
    }
}

// ============================================================================
// Tests
// ============================================================================
