//! # slide-limit
//!
//! `slide-limit` answers one question per event: "has this key seen `N` events
//! within the trailing window `W`?"
//!
//! ## Core Philosophy
//!
//! Each key owns a [`SlidingWindowCounter`], a fixed-size ring of time buckets.
//! Recording an event into the bucket that is already at the head of the ring is
//! a single atomic add. Only bucket rollover (advancing the head and evicting the
//! tail) takes an exclusive lock, so the common case never blocks on other
//! writers.
//!
//! ## Key Concepts
//!
//! * **Bounded Memory**: A counter never retains more than
//!   `ceil(window / granularity)` buckets, and a [`KeyedCounterCache`] drops keys
//!   that stay idle for a full window.
//! * **Integer Time**: All instants are [`Ticks`] (nanoseconds from an anchor), so
//!   bucket ids are exact integer divisions.
//! * **Decisions as Control Flow**: [`Admission`] returns `ControlFlow<Reason>`,
//!   `Continue` to admit and `Break` to reject.
//!
//! ## Example
//!
//! ```rust
//! use slide_limit::Admission;
//! use slide_limit::Limit;
//! use std::time::Duration;
//!
//! let admission = Admission::new();
//! let limit = Limit::new(100, Duration::from_secs(60));
//!
//! if admission.check("client-42", &limit)?.is_continue() {
//!     // Request allowed
//! }
//! # Ok::<(), slide_limit::WindowError>(())
//! ```

use std::time::Duration;

mod admission;
mod bucket;
mod cache;
mod error;
mod sliding_window;

pub use admission::Admission;
pub use admission::Limit;
pub use bucket::TimeBucket;
pub use cache::CounterParams;
pub use cache::KeyedCounterCache;
pub use cache::Lookup;
pub use error::WindowError;
pub use sliding_window::SlidingWindowCounter;

/// Nanoseconds elapsed since an anchor instant.
pub type Ticks = u64;

/// Converts a duration to [`Ticks`], saturating at `Ticks::MAX`.
#[inline]
pub fn ticks(duration: Duration) -> Ticks {
    u64::try_from(duration.as_nanos()).unwrap_or(Ticks::MAX)
}

/// Reasons why an event might be rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The key has already used its allowance in the trailing window.
    Exceeded {
        /// Events counted in the window before this one.
        observed: u64,
        /// The configured maximum for the window.
        limit: u64,
        /// Time until the oldest counted bucket leaves the window.
        retry_after: Duration,
    },
}
