//! Caching layer.
//!
//! - [`CacheStore`]: byte-value store with per-entry timeouts, shared by the
//!   page cache and the `phasedcache` template tag.
//! - [`MemoryCache`]: in-process store on a concurrent map.
//! - [`vary`]: `Vary` header manipulation around cache writes.
//! - [`PageCache`]: whole-response cache keyed by path and varying request headers.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

pub mod page;
pub mod vary;

pub use page::{CachedPage, PageCache};

/// A key/value store for cached bytes.
///
/// Implementations must be safe to share across tasks; each call is atomic on
/// its own but no cross-call consistency is implied.
pub trait CacheStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Stores `value` for `timeout`. A zero timeout expires immediately.
    fn set(&self, key: &str, value: Bytes, timeout: Duration);

    /// Removes `key`, returning whether a live entry was present.
    fn delete(&self, key: &str) -> bool;

    fn clear(&self);

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`CacheStore`]. Expired entries are evicted lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: Bytes, timeout: Duration) {
        let expires_at = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(365 * 24 * 60 * 60));
        self.entries
            .insert(key.to_owned(), Entry { value, expires_at });
    }

    fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now))
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.is_live(now))
            .count()
    }
}
