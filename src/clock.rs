//! Virtual clock and day-boundary arithmetic, injected into the scheduler so
//! tests can drive day rollovers without sleeping real time.

use chrono::{DateTime, Utc};

pub const SECONDS_PER_DAY: i64 = 86_400;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only advances when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now.timestamp()),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now
            .fetch_add(seconds, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now
            .store(now.timestamp(), std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.now.load(std::sync::atomic::Ordering::SeqCst), 0)
            .unwrap_or_default()
    }
}

/// `today` / `dayCutoff` derived from a deck creation epoch and the current
/// time. `today` is the integer day index since deck creation; `dayCutoff`
/// is the epoch second at which `today` next increments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DayCalendar {
    pub today: i64,
    pub day_cutoff: i64,
}

impl Default for DayCalendar {
    fn default() -> Self {
        Self {
            today: 0,
            day_cutoff: SECONDS_PER_DAY,
        }
    }
}

impl DayCalendar {
    pub fn compute(deck_created_at: i64, now: i64) -> Self {
        let today = (now - deck_created_at).div_euclid(SECONDS_PER_DAY);
        let day_cutoff = deck_created_at + (today + 1) * SECONDS_PER_DAY;
        Self { today, day_cutoff }
    }

    pub fn is_stale(&self, now: i64) -> bool {
        now > self.day_cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_today_and_cutoff_from_creation() {
        let cal = DayCalendar::compute(0, 0);
        assert_eq!(cal.today, 0);
        assert_eq!(cal.day_cutoff, SECONDS_PER_DAY);
    }

    #[test]
    fn rolls_over_after_one_day() {
        let cal = DayCalendar::compute(0, 86_500);
        assert_eq!(cal.today, 1);
        assert_eq!(cal.day_cutoff, 2 * SECONDS_PER_DAY);
    }

    #[test]
    fn is_stale_detects_past_cutoff() {
        let cal = DayCalendar::compute(0, 100);
        assert!(!cal.is_stale(SECONDS_PER_DAY - 1));
        assert!(cal.is_stale(SECONDS_PER_DAY + 1));
    }

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::new(DateTime::from_timestamp(0, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 0);
        clock.advance(SECONDS_PER_DAY);
        assert_eq!(clock.now().timestamp(), SECONDS_PER_DAY);
    }
}
