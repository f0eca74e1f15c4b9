//! # Day Keys
//!
//! Every ledger is partitioned by the calendar date of "now" in one reference
//! time zone. There is no reset job: each request resolves its own key and a
//! new day's ledger appears the first time anyone touches it.
//!
//! - Format: `YYYY-MM-DD`
//! - Zone: configured, defaults to `Asia/Kolkata`
//! - Floor semantics: local midnight itself already belongs to the new day
use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;

pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant, used to drive rollover in tests.
pub struct ManualClock {
    instant: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock() = instant;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut instant = self.instant.lock();
        *instant += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(DAY_KEY_FORMAT).to_string())
    }

    /// Accepts only canonical keys, so `2025-1-5` is rejected.
    pub fn parse(input: &str) -> Option<Self> {
        let date = NaiveDate::parse_from_str(input, DAY_KEY_FORMAT).ok()?;
        let key = Self::from_date(date);

        (key.0 == input).then_some(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct DayKeyResolver {
    zone: Tz,
    clock: Arc<dyn Clock>,
}

impl DayKeyResolver {
    pub fn new(zone: Tz, clock: Arc<dyn Clock>) -> Self {
        Self { zone, clock }
    }

    pub fn today_key(&self) -> DayKey {
        self.key_at(self.clock.now())
    }

    pub fn key_at(&self, instant: DateTime<Utc>) -> DayKey {
        DayKey::from_date(instant.with_timezone(&self.zone).date_naive())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use chrono_tz::Asia::Kolkata;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_key_uses_reference_zone_not_utc() {
        let resolver = DayKeyResolver::new(Kolkata, Arc::new(SystemClock));

        // 20:00 UTC is 01:30 the next day in Kolkata
        assert_eq!(resolver.key_at(utc(2025, 11, 1, 20, 0, 0)).as_str(), "2025-11-02");
        assert_eq!(resolver.key_at(utc(2025, 11, 1, 10, 0, 0)).as_str(), "2025-11-01");
    }

    #[test]
    fn test_local_midnight_floor() {
        let clock = Arc::new(ManualClock::new(utc(2025, 11, 1, 18, 29, 59)));
        let resolver = DayKeyResolver::new(Kolkata, clock.clone());

        assert_eq!(resolver.today_key().as_str(), "2025-11-01");

        clock.advance(Duration::seconds(1));
        assert_eq!(resolver.today_key().as_str(), "2025-11-02");

        clock.set(utc(2025, 11, 1, 18, 29, 59) + Duration::milliseconds(999));
        assert_eq!(resolver.today_key().as_str(), "2025-11-01");
    }

    #[test]
    fn test_year_boundary() {
        let resolver = DayKeyResolver::new(Kolkata, Arc::new(SystemClock));

        assert_eq!(resolver.key_at(utc(2025, 12, 31, 18, 30, 0)).as_str(), "2026-01-01");
    }

    #[test]
    fn test_parse_canonical_only() {
        assert_eq!(DayKey::parse("2025-11-01").unwrap().to_string(), "2025-11-01");
        assert!(DayKey::parse("2025-1-5").is_none());
        assert!(DayKey::parse("2025-02-30").is_none());
        assert!(DayKey::parse("yesterday").is_none());
    }
}
