use std::ops::ControlFlow;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use crate::CounterParams;
use crate::KeyedCounterCache;
use crate::Reason;
use crate::Ticks;
use crate::WindowError;
use crate::ticks;

/// At most `max_count` events per trailing `window`.
///
/// A zero in either field marks the limit as exempt: every event is admitted
/// and nothing is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_count: u64,
    pub window: Duration,
}

impl Limit {
    pub fn new(max_count: u64, window: Duration) -> Self {
        Self { max_count, window }
    }

    #[inline]
    pub fn is_exempt(&self) -> bool {
        self.max_count == 0 || self.window.is_zero()
    }
}

/// Per-key admission decisions over a shared [`KeyedCounterCache`].
///
/// # Algorithm
///
/// 1. **Exemption:** a zero limit admits unconditionally.
/// 2. **Lookup:** fetch or create the key's counter, refreshing its expiry.
///    The call that creates the counter is admitted without being recorded.
/// 3. **Observe:** count the events in `[now - window, now)`.
/// 4. **Decide:** reject when `observed >= max_count - 1`, otherwise record
///    the event and admit. Rejected events are never recorded, so a flood of
///    rejected traffic cannot keep a key locked out.
///
/// Together, steps 2 and 4 admit exactly `max_count` events per window.
#[derive(Debug)]
pub struct Admission {
    cache: KeyedCounterCache,
    clock: Clock,
    anchor: Instant,
}

impl Default for Admission {
    fn default() -> Self {
        Self::new()
    }
}

impl Admission {
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    pub fn with_clock(clock: Clock) -> Self {
        let anchor = clock.now();
        Self {
            cache: KeyedCounterCache::new(),
            clock,
            anchor,
        }
    }

    /// Ticks elapsed since this admission was created.
    #[inline]
    pub fn now(&self) -> Ticks {
        ticks(self.clock.now().duration_since(self.anchor))
    }

    /// Decides whether the event for `key` is admitted right now.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidArgument`] if `limit` is too short to
    /// build a counter for (a window under one second).
    pub fn check(&self, key: &str, limit: &Limit) -> Result<ControlFlow<Reason>, WindowError> {
        self.check_at(key, limit, self.now())
    }

    /// Decides whether the event for `key` at `now` is admitted.
    pub fn check_at(
        &self,
        key: &str,
        limit: &Limit,
        now: Ticks,
    ) -> Result<ControlFlow<Reason>, WindowError> {
        if limit.is_exempt() {
            return Ok(ControlFlow::Continue(()));
        }

        let params = CounterParams::for_window(now, limit.window);
        let lookup = self.cache.get_or_create(key, &params, now)?;
        if lookup.created {
            return Ok(ControlFlow::Continue(()));
        }

        let from = now.saturating_sub(ticks(limit.window));
        let observed = lookup.counter.count_in_window(from, limit.window);
        if observed >= limit.max_count - 1 {
            let retry_after = lookup
                .counter
                .oldest_in_window(from, limit.window)
                .map(|bucket| {
                    // Window starts are inclusive, so the bucket is counted
                    // until `now - window` passes its timestamp.
                    let leaves_at = bucket
                        .timestamp
                        .saturating_add(ticks(limit.window))
                        .saturating_add(1);
                    Duration::from_nanos(leaves_at.saturating_sub(now))
                })
                .unwrap_or(limit.window);
            tracing::debug!(key, observed, limit = limit.max_count, "rejecting event");
            return Ok(ControlFlow::Break(Reason::Exceeded {
                observed,
                limit: limit.max_count,
                retry_after,
            }));
        }

        lookup.counter.increment(now, 1);
        Ok(ControlFlow::Continue(()))
    }

    /// Drops every counter whose key has been idle for a full window.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired(self.now())
    }

    pub fn cache(&self) -> &KeyedCounterCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Ticks = 1_000_000_000;
    const MINUTE: Ticks = 60 * SECOND;

    fn run(admission: &Admission, limit: &Limit, times: &[Ticks]) -> Vec<bool> {
        times
            .iter()
            .map(|&t| admission.check_at("client", limit, t).unwrap().is_continue())
            .collect()
    }

    #[test]
    fn it_rejects_past_the_limit() {
        let admission = Admission::new();
        let limit = Limit::new(4, Duration::from_secs(24 * 60 * 60));

        let outcomes = run(&admission, &limit, &[0, SECOND, 2 * SECOND, 3 * SECOND, 4 * SECOND]);
        assert_eq!(outcomes, vec![true, true, true, true, false]);
    }

    #[test]
    fn it_admits_below_the_limit() {
        let admission = Admission::new();
        let limit = Limit::new(4, Duration::from_secs(24 * 60 * 60));

        let outcomes = run(&admission, &limit, &[0, SECOND, 2 * SECOND]);
        assert_eq!(outcomes, vec![true, true, true]);
    }

    #[test]
    fn it_recovers_once_events_slide_out() {
        let admission = Admission::new();
        let limit = Limit::new(4, Duration::from_secs(10 * 60));

        let outcomes = run(
            &admission,
            &limit,
            &[0, MINUTE, 2 * MINUTE, 3 * MINUTE, 4 * MINUTE, 11 * MINUTE + 30 * SECOND],
        );
        assert_eq!(outcomes, vec![true, true, true, true, false, true]);
    }

    #[test]
    fn first_event_is_not_recorded() {
        let admission = Admission::new();
        let limit = Limit::new(4, Duration::from_secs(60));

        admission.check_at("client", &limit, 0).unwrap();
        let counter = admission
            .cache()
            .get_or_create("client", &CounterParams::for_window(0, limit.window), 0)
            .unwrap()
            .counter;
        assert_eq!(counter.total_events(), 0);

        admission.check_at("client", &limit, SECOND).unwrap();
        assert_eq!(counter.total_events(), 1);
    }

    #[test]
    fn rejected_events_are_not_recorded() {
        let admission = Admission::new();
        let limit = Limit::new(2, Duration::from_secs(60));

        let outcomes = run(&admission, &limit, &[0, SECOND, 2 * SECOND, 3 * SECOND, 4 * SECOND]);
        assert_eq!(outcomes, vec![true, true, false, false, false]);

        let lookup = admission
            .cache()
            .get_or_create("client", &CounterParams::for_window(0, limit.window), 5 * SECOND)
            .unwrap();
        assert_eq!(lookup.counter.total_events(), 1);
    }

    #[test]
    fn a_limit_of_one_admits_only_the_first_event() {
        let admission = Admission::new();
        let limit = Limit::new(1, Duration::from_secs(60));

        let outcomes = run(&admission, &limit, &[0, SECOND, 2 * SECOND]);
        assert_eq!(outcomes, vec![true, false, false]);
    }

    #[test]
    fn zero_limits_are_exempt() {
        let admission = Admission::new();

        for limit in [
            Limit::new(0, Duration::from_secs(60)),
            Limit::new(4, Duration::ZERO),
        ] {
            assert!(limit.is_exempt());
            let outcomes = run(&admission, &limit, &[0; 10]);
            assert!(outcomes.iter().all(|admitted| *admitted));
        }
        assert!(admission.cache().is_empty());
    }

    #[test]
    fn short_windows_fail_to_build() {
        let admission = Admission::new();
        let limit = Limit::new(4, Duration::from_millis(900));

        assert!(matches!(
            admission.check_at("client", &limit, 0),
            Err(WindowError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn keys_are_limited_independently() {
        let admission = Admission::new();
        let limit = Limit::new(2, Duration::from_secs(60));

        for t in 0..2 {
            assert!(admission.check_at("a", &limit, t * SECOND).unwrap().is_continue());
        }
        assert!(admission.check_at("a", &limit, 2 * SECOND).unwrap().is_break());
        assert!(admission.check_at("b", &limit, 2 * SECOND).unwrap().is_continue());
    }

    #[test]
    fn rejection_reports_when_to_retry() {
        let admission = Admission::new();
        let limit = Limit::new(3, Duration::from_secs(10));

        run(&admission, &limit, &[0, SECOND, 2 * SECOND]);
        let decision = admission.check_at("client", &limit, 4 * SECOND).unwrap();

        // The oldest counted bucket starts at 1s and is counted through 11s
        assert_eq!(
            decision,
            ControlFlow::Break(Reason::Exceeded {
                observed: 2,
                limit: 3,
                retry_after: Duration::from_secs(7) + Duration::from_nanos(1),
            })
        );
    }

    #[test]
    fn retrying_at_retry_after_is_admitted() {
        let admission = Admission::new();
        let limit = Limit::new(3, Duration::from_secs(10));

        run(&admission, &limit, &[0, SECOND, 2 * SECOND]);
        let now = 4 * SECOND;
        let ControlFlow::Break(Reason::Exceeded { retry_after, .. }) =
            admission.check_at("client", &limit, now).unwrap()
        else {
            panic!("expected a rejection");
        };

        let retry_at = now + ticks(retry_after);
        assert!(admission.check_at("client", &limit, retry_at - 1).unwrap().is_break());
        assert!(admission.check_at("client", &limit, retry_at).unwrap().is_continue());
    }

    #[tokio::test]
    async fn test_admission_deterministic_with_mock_clock() {
        let (clock, mock) = Clock::mock();
        let admission = Admission::with_clock(clock);
        let limit = Limit::new(3, Duration::from_secs(10));

        for _ in 0..3 {
            assert!(admission.check("client", &limit).unwrap().is_continue());
            mock.increment(Duration::from_secs(1));
        }
        assert!(admission.check("client", &limit).unwrap().is_break());

        // Idle for a full window: the entry expires and is purged
        mock.increment(Duration::from_secs(10));
        assert_eq!(admission.purge_expired(), 1);
        assert!(admission.cache().is_empty());
        assert!(admission.check("client", &limit).unwrap().is_continue());
    }
}
