use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::SlidingWindowCounter;
use crate::Ticks;
use crate::WindowError;
use crate::ticks;

/// How many buckets a window is split into when the granularity is derived.
const BUCKETS_PER_WINDOW: u32 = 10;

/// Parameters used to build a counter the first time a key is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterParams {
    pub start: Ticks,
    pub granularity: Duration,
    pub window: Duration,
}

impl CounterParams {
    /// Parameters for `window`, split into ten buckets.
    pub fn for_window(start: Ticks, window: Duration) -> Self {
        Self {
            start,
            granularity: window / BUCKETS_PER_WINDOW,
            window,
        }
    }

    fn build(&self) -> Result<SlidingWindowCounter, WindowError> {
        SlidingWindowCounter::new(self.start, self.granularity, self.window)
    }
}

/// The counter found (or created) for a key.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub counter: Arc<SlidingWindowCounter>,
    /// `true` if this call created the counter.
    pub created: bool,
}

#[derive(Debug)]
struct CacheEntry {
    counter: Arc<SlidingWindowCounter>,
    expires_at: AtomicU64,
    ttl: Ticks,
}

impl CacheEntry {
    fn new(counter: SlidingWindowCounter, now: Ticks) -> Self {
        let ttl = ticks(counter.window());
        Self {
            counter: Arc::new(counter),
            expires_at: AtomicU64::new(now.saturating_add(ttl)),
            ttl,
        }
    }

    #[inline]
    fn is_expired(&self, now: Ticks) -> bool {
        now >= self.expires_at.load(Ordering::Acquire)
    }

    /// Pushes the deadline forward. Never pulls it back, so a caller with a
    /// slightly stale clock cannot shorten another caller's refresh.
    #[inline]
    fn touch(&self, now: Ticks) {
        self.expires_at
            .fetch_max(now.saturating_add(self.ttl), Ordering::AcqRel);
    }

    fn lookup(&self, created: bool) -> Lookup {
        Lookup {
            counter: Arc::clone(&self.counter),
            created,
        }
    }
}

/// Owns one [`SlidingWindowCounter`] per key.
///
/// Entries expire on a sliding schedule: every lookup pushes the deadline to
/// `now + window`. Expired entries are never handed out. They are replaced
/// lazily on the next lookup, or dropped in bulk by [`purge_expired`].
///
/// [`purge_expired`]: KeyedCounterCache::purge_expired
#[derive(Debug, Default)]
pub struct KeyedCounterCache {
    entries: DashMap<String, CacheEntry>,
}

impl KeyedCounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live counter for `key`, creating it from `params` if the
    /// key is unknown or its entry has expired.
    ///
    /// Exactly one counter is created per key even when many callers race on
    /// the first lookup: creation happens while holding the entry's shard
    /// lock, so every racer observes the same instance.
    ///
    /// # Errors
    ///
    /// Propagates [`WindowError::InvalidArgument`] if `params` cannot build a
    /// counter.
    pub fn get_or_create(
        &self,
        key: &str,
        params: &CounterParams,
        now: Ticks,
    ) -> Result<Lookup, WindowError> {
        // Shared lock only. The guard must be released before `entry()`
        // takes the write lock on the same shard.
        if let Some(entry) = self.entries.get(key)
            && !entry.is_expired(now)
        {
            entry.touch(now);
            return Ok(entry.lookup(false));
        }

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    tracing::trace!(key, "replacing expired counter");
                    occupied.insert(CacheEntry::new(params.build()?, now));
                    Ok(occupied.get().lookup(true))
                } else {
                    // Lost the race to another creator
                    occupied.get().touch(now);
                    Ok(occupied.get().lookup(false))
                }
            }
            Entry::Vacant(vacant) => {
                tracing::trace!(key, window = ?params.window, "creating counter");
                let entry = vacant.insert(CacheEntry::new(params.build()?, now));
                Ok(entry.lookup(true))
            }
        }
    }

    /// Whether `key` has an entry that has not yet expired.
    pub fn contains_live(&self, key: &str, now: Ticks) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Drops the entry for `key`, returning its counter.
    pub fn remove(&self, key: &str) -> Option<Arc<SlidingWindowCounter>> {
        self.entries.remove(key).map(|(_, entry)| entry.counter)
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self, now: Ticks) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "purged expired counters");
        }
        purged
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
