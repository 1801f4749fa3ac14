//! Wall-clock reconciliation.
//!
//! Remaining time is never decremented by "one per callback". Each stimulus
//! measures how many whole seconds passed since the last committed tick and
//! commits exactly that many, so throttled or bursty schedulers neither lose
//! nor double-count time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock shared between clones. Used by tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid instant.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Outcome of measuring the time since the last committed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Whole seconds that passed.
    pub elapsed_secs: u64,
    /// `last_tick_at + elapsed_secs`; the sub-second remainder stays pending.
    pub next_tick_at: DateTime<Utc>,
}

/// Whole seconds elapsed between `last_tick_at` and `now`.
///
/// Returns `None` when less than one second passed or `now` lies before
/// `last_tick_at`.
pub fn reconcile(last_tick_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Reconciliation> {
    let elapsed_secs = (now - last_tick_at).num_seconds();
    if elapsed_secs <= 0 {
        return None;
    }
    Some(Reconciliation {
        elapsed_secs: elapsed_secs as u64,
        next_tick_at: last_tick_at + Duration::seconds(elapsed_secs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn sub_second_gap_is_a_noop() {
        assert!(reconcile(t0(), t0() + Duration::milliseconds(999)).is_none());
        assert!(reconcile(t0(), t0()).is_none());
    }

    #[test]
    fn backwards_time_is_a_noop() {
        assert!(reconcile(t0(), t0() - Duration::seconds(5)).is_none());
    }

    #[test]
    fn remainder_is_preserved() {
        let r = reconcile(t0(), t0() + Duration::milliseconds(2_750)).unwrap();
        assert_eq!(r.elapsed_secs, 2);
        assert_eq!(r.next_tick_at, t0() + Duration::seconds(2));
    }

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(t0());
        let other = clock.clone();
        clock.advance(Duration::seconds(90));
        assert_eq!(other.now(), t0() + Duration::seconds(90));
    }
}
