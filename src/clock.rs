//! Injectable wall-clock
//!
//! "Today", "this hour", and the month partition key are all relative to
//! local time, so the pipeline takes the clock as a dependency instead of
//! reading it inline. Tests supply a `FixedClock`.

use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};

/// Source of the current local wall-clock time
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// The real local clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock pinned to one instant, for deterministic runs and tests
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Month partition key, e.g. `201501`
pub fn month_key(clock: &dyn Clock) -> String {
    clock.now().format("%Y%m").to_string()
}

/// Midnight at the start of the clock's current day
pub fn start_of_day(clock: &dyn Clock) -> NaiveDateTime {
    clock.now().date().and_time(NaiveTime::MIN)
}

/// Top of the clock's current hour
pub fn start_of_hour(clock: &dyn Clock) -> NaiveDateTime {
    let now = clock.now();
    now.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(now.hour()))
}

/// Local hour of day, 0-23 (drives the retention threshold)
pub fn current_hour(clock: &dyn Clock) -> u32 {
    clock.now().hour()
}

/// Suffix appended to consumed input files, e.g. `20150101_1305`
pub fn timestamp_suffix(clock: &dyn Clock) -> String {
    clock.now().format("%Y%m%d_%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_month_key_and_suffix() {
        let clock = fixed(2015, 1, 1, 13, 5);
        assert_eq!(month_key(&clock), "201501");
        assert_eq!(timestamp_suffix(&clock), "20150101_1305");
    }

    #[test]
    fn test_day_and_hour_boundaries() {
        let clock = fixed(2015, 1, 1, 13, 45);
        assert_eq!(
            start_of_day(&clock),
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_hour(&clock),
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap().and_hms_opt(13, 0, 0).unwrap()
        );
        assert_eq!(current_hour(&clock), 13);
    }
}
