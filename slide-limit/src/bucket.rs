use crate::Ticks;

/// A snapshot of one time bucket: the start of its granularity-sized
/// interval and the number of events recorded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub timestamp: Ticks,
    pub count: u64,
}

impl TimeBucket {
    pub fn new(timestamp: Ticks, count: u64) -> Self {
        Self { timestamp, count }
    }

    /// Whether the bucket start lies in `[from, to)`.
    #[inline]
    pub fn starts_within(&self, from: Ticks, to: Ticks) -> bool {
        self.timestamp >= from && self.timestamp < to
    }
}
