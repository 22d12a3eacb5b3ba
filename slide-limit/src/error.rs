/// Errors produced by the sliding window counters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// A counter was constructed with an unusable granularity or window.
    ///
    /// Raised only at construction time, never by `increment` or counting.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// The offending parameter.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A logical bucket index fell outside the retained range.
    #[error("bucket index {index} out of range for {len} retained buckets")]
    IndexOutOfRange { index: usize, len: usize },
}
