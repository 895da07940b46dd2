use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Source of "now". Swapped for a manual clock in tests so the
/// today-cutoff and watchdog logic can be pinned to a known instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock advanced by hand. Test-only in spirit, but public so the
/// integration tests can drive it.
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// All date arithmetic happens through this provider in one fixed
/// business timezone. No other component calls `Utc::now()` directly.
#[derive(Clone)]
pub struct TimeProvider {
    tz: Tz,
    clock: Arc<dyn Clock>,
}

impl TimeProvider {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(tz: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { tz, clock }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn now_local(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }

    /// Current hour of day in business time, 0-23.
    pub fn current_hour(&self) -> u32 {
        self.now_local().hour()
    }

    /// Business-local wall time for a UTC instant.
    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        self.local(instant).time()
    }

    /// Resolves a business-local wall time to a UTC instant. An ambiguous
    /// mapping (DST fold) takes the earlier instant; a skipped wall time
    /// is rejected rather than silently shifted.
    pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>> {
        match self.tz.from_local_datetime(&date.and_time(time)) {
            chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            chrono::LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
            chrono::LocalResult::None => Err(Error::validation(format!(
                "{} {} does not exist in {}",
                date, time, self.tz
            ))),
        }
    }

    pub fn is_future(&self, instant: DateTime<Utc>) -> bool {
        instant > self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn provider_at(iso: &str) -> TimeProvider {
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        let now = iso.parse::<DateTime<Utc>>().unwrap();
        TimeProvider::with_clock(tz, Arc::new(ManualClock::new(now)))
    }

    #[test]
    fn today_follows_business_timezone_not_utc() {
        // 01:30 UTC is still the previous evening in Buenos Aires (UTC-3).
        let time = provider_at("2026-03-10T01:30:00Z");
        assert_eq!(
            time.today(),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        assert_eq!(time.current_hour(), 22);
    }

    #[test]
    fn instant_round_trips_through_local() {
        let time = provider_at("2026-03-10T12:00:00Z");
        let date = NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        let at = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        let instant = time.instant_at(date, at).unwrap();
        assert_eq!(time.local_date(instant), date);
        assert_eq!(time.local_time(instant), at);
    }

    #[test]
    fn is_future_compares_against_the_injected_clock() {
        let time = provider_at("2026-03-10T12:00:00Z");
        let before = time.now_utc();
        let later = before + Duration::minutes(11);
        assert!(time.is_future(later));
        assert!(!time.is_future(before));
    }
}
