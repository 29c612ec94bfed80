//! Duplicate-delivery suppression.
//!
//! The upstream API occasionally re-delivers a `newMessage` event with the
//! same message id and identical text. [`EventCache`] remembers the last text
//! seen per message id for a short window so such retransmissions can be
//! collapsed into one delivery.
//!
//! This is an exact-text heuristic inside a TTL window, not an idempotency
//! guarantee: an edit that restores earlier text after the window has passed
//! is delivered again.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// Largest capacity an [`EventCache`] will allocate for.
pub const MAX_CAPACITY: u64 = 1 << 20;

/// Sizing and expiry of an [`EventCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of message ids remembered.
    pub capacity: u64,
    /// How long an entry lives after its last write.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(60),
        }
    }
}

struct Entry {
    value: Box<str>,
    written: Instant,
}

impl Entry {
    fn is_live(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.written) < ttl
    }
}

/// Bounded, time-expiring map of message id to last seen text.
///
/// Cloning is cheap and clones share the same entries.
#[derive(Clone)]
pub struct EventCache {
    inner: Arc<Mutex<LruCache<String, Entry>>>,
    config: CacheConfig,
}

impl EventCache {
    /// Creates a cache with the given capacity and TTL.
    ///
    /// The capacity is clamped to `1..=MAX_CAPACITY`. When full, inserting
    /// evicts the least-recently-used entry first.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = usize::try_from(config.capacity.min(MAX_CAPACITY))
            .ok()
            .and_then(NonZeroUsize::new)
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            config,
        }
    }

    /// Returns the configuration this cache was built with.
    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Records `key → value` and reports whether it was a duplicate.
    ///
    /// Returns `true` if `key` is present (and not expired) with exactly
    /// `value`; the hit marks the entry as recently used but keeps its write
    /// time. Otherwise stores the pair and returns `false`.
    pub fn record_and_check(&self, key: &str, value: &str) -> bool {
        let now = Instant::now();
        let mut cache = self.inner.lock();

        match cache.get(key) {
            Some(entry) if entry.is_live(self.config.ttl, now) => {
                if entry.value.as_ref() == value {
                    return true;
                }
            }
            Some(_) => {
                cache.pop(key);
            }
            None => {}
        }

        cache.put(
            key.to_string(),
            Entry {
                value: value.into(),
                written: now,
            },
        );
        false
    }

    /// Returns `true` if a live entry exists for `key`.
    ///
    /// Does not affect the eviction order.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .peek(key)
            .is_some_and(|entry| entry.is_live(self.config.ttl, Instant::now()))
    }

    /// Returns the number of live entries.
    pub fn entry_count(&self) -> u64 {
        let now = Instant::now();
        self.inner
            .lock()
            .iter()
            .filter(|(_, entry)| entry.is_live(self.config.ttl, now))
            .count() as u64
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for EventCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCache")
            .field("capacity", &self.config.capacity)
            .field("ttl", &self.config.ttl)
            .field("len", &self.inner.lock().len())
            .finish()
    }
}
