use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::RwLock;

use crate::Ticks;
use crate::TimeBucket;
use crate::WindowError;
use crate::ticks;

const MIN_WINDOW: Duration = Duration::from_secs(1);
const MIN_GRANULARITY: Duration = Duration::from_millis(100);

/// Marks a slot that has never held a bucket. No real bucket id reaches it
/// because granularity is at least 100ms.
const EMPTY: u64 = u64::MAX;

#[derive(Debug)]
struct Slot {
    id: AtomicU64,
    count: AtomicU64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            id: AtomicU64::new(EMPTY),
            count: AtomicU64::new(0),
        }
    }
}

/// Ring positions. Only mutated under the write lock.
#[derive(Debug)]
struct Cursor {
    head: usize,
    tail: usize,
    len: usize,
}

/// A time-bucketed ring buffer counting events over a trailing window.
///
/// Events are grouped into buckets of `granularity`; the ring holds
/// `ceil(window / granularity)` of them, ordered oldest (tail) to newest (head).
///
/// Increments that land in the current head bucket are a single atomic add.
/// Opening a new bucket takes the write lock, and windowed reads take the read
/// lock so they never observe a half-finished rollover.
#[derive(Debug)]
pub struct SlidingWindowCounter {
    start: Ticks,
    granularity: Ticks,
    window: Ticks,
    slots: Box<[Slot]>,
    /// Published copy of `cursor.head` for the lock-free fast path.
    head: AtomicUsize,
    cursor: RwLock<Cursor>,
    /// Every event ever recorded. Approximate under contention, diagnostics only.
    total: AtomicU64,
}

impl SlidingWindowCounter {
    /// Creates a new counter.
    ///
    /// # Arguments
    ///
    /// * `start` - The instant the counter was created at.
    /// * `granularity` - The span covered by one bucket, at least 100ms.
    /// * `window` - The trailing span the ring covers, at least one second and
    ///   strictly longer than `granularity`.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidArgument`] if any constraint is violated.
    pub fn new(start: Ticks, granularity: Duration, window: Duration) -> Result<Self, WindowError> {
        if window < MIN_WINDOW {
            return Err(WindowError::InvalidArgument {
                name: "window",
                reason: "must be at least one second",
            });
        }
        if granularity < MIN_GRANULARITY {
            return Err(WindowError::InvalidArgument {
                name: "granularity",
                reason: "must be at least 100ms",
            });
        }
        if granularity >= window {
            return Err(WindowError::InvalidArgument {
                name: "granularity",
                reason: "must be shorter than the window",
            });
        }

        let granularity = ticks(granularity);
        let window = ticks(window);
        let capacity = window.div_ceil(granularity) as usize;
        let slots: Box<[Slot]> = (0..capacity).map(|_| Slot::empty()).collect();

        Ok(Self {
            start,
            granularity,
            window,
            slots,
            head: AtomicUsize::new(capacity - 1),
            cursor: RwLock::new(Cursor {
                head: capacity - 1,
                tail: 0,
                len: 0,
            }),
            total: AtomicU64::new(0),
        })
    }

    /// Records `amount` events at instant `at`.
    #[inline]
    pub fn increment(&self, at: Ticks, amount: u64) {
        self.total.fetch_add(amount, Ordering::Relaxed);
        let id = at / self.granularity;

        // 1. Fast path: the bucket is already open at the head
        let head = &self.slots[self.head.load(Ordering::Acquire)];
        if head.id.load(Ordering::Acquire) == id {
            head.count.fetch_add(amount, Ordering::AcqRel);
            return;
        }

        // 2. Slow path: open a new bucket
        self.roll_over(id, amount);
    }

    fn roll_over(&self, id: u64, amount: u64) {
        let mut cursor = self.cursor.write();

        // Someone else may have opened this bucket while we waited. Events
        // older than the head are folded into it to keep the ring ordered.
        let head = &self.slots[cursor.head];
        if cursor.len > 0 && id <= head.id.load(Ordering::Acquire) {
            head.count.fetch_add(amount, Ordering::AcqRel);
            return;
        }

        let next = (cursor.head + 1) % self.slots.len();
        let slot = &self.slots[next];
        slot.count.store(amount, Ordering::Release);
        slot.id.store(id, Ordering::Release);

        if cursor.len == self.slots.len() {
            cursor.tail = (cursor.tail + 1) % self.slots.len();
        } else {
            cursor.len += 1;
        }
        cursor.head = next;
        self.head.store(next, Ordering::Release);
    }

    /// Sums the events whose bucket starts in `[from, from + duration)`.
    ///
    /// An end instant that overflows is clamped to `Ticks::MAX`, making the
    /// window open-ended.
    pub fn count_in_window(&self, from: Ticks, duration: Duration) -> u64 {
        let to = window_end(from, duration);
        let cursor = self.cursor.read();

        let mut sum = 0;
        for index in 0..cursor.len {
            let Ok(bucket) = self.bucket_at_locked(&cursor, index) else {
                break;
            };
            if bucket.starts_within(from, to) {
                sum += bucket.count;
            } else if bucket.timestamp >= to {
                // Buckets are time ordered
                break;
            }
        }
        sum
    }

    /// The oldest retained bucket starting in `[from, from + duration)`.
    pub fn oldest_in_window(&self, from: Ticks, duration: Duration) -> Option<TimeBucket> {
        let to = window_end(from, duration);
        let cursor = self.cursor.read();

        (0..cursor.len)
            .filter_map(|index| self.bucket_at_locked(&cursor, index).ok())
            .take_while(|bucket| bucket.timestamp < to)
            .find(|bucket| bucket.timestamp >= from)
    }

    /// The raw total over every retained bucket, whether or not it is still
    /// inside any particular window.
    pub fn total_count(&self) -> u64 {
        let cursor = self.cursor.read();
        (0..cursor.len)
            .filter_map(|index| self.bucket_at_locked(&cursor, index).ok())
            .map(|bucket| bucket.count)
            .sum()
    }

    /// Every event ever recorded, including evicted ones.
    pub fn total_events(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// A snapshot of the retained buckets, oldest first.
    pub fn buckets(&self) -> Vec<TimeBucket> {
        let cursor = self.cursor.read();
        (0..cursor.len)
            .filter_map(|index| self.bucket_at_locked(&cursor, index).ok())
            .collect()
    }

    fn bucket_at_locked(&self, cursor: &Cursor, index: usize) -> Result<TimeBucket, WindowError> {
        if index >= cursor.len {
            return Err(WindowError::IndexOutOfRange {
                index,
                len: cursor.len,
            });
        }
        let slot = &self.slots[(cursor.tail + index) % self.slots.len()];
        Ok(TimeBucket::new(
            slot.id.load(Ordering::Acquire).saturating_mul(self.granularity),
            slot.count.load(Ordering::Acquire),
        ))
    }

    /// Number of buckets the ring can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of buckets currently retained.
    pub fn len(&self) -> usize {
        self.cursor.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self) -> Ticks {
        self.start
    }

    pub fn granularity(&self) -> Duration {
        Duration::from_nanos(self.granularity)
    }

    pub fn window(&self) -> Duration {
        Duration::from_nanos(self.window)
    }
}

#[inline]
fn window_end(from: Ticks, duration: Duration) -> Ticks {
    from.checked_add(ticks(duration)).unwrap_or(Ticks::MAX)
}
