//! Day keys used to partition the verdict cache.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Identifier for one day of the weekly menu cycle.
///
/// Normally a full English weekday name (`"Monday"`), but any string is a
/// valid key; the cache never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for the weekday `now` falls on in the given timezone.
    pub fn today(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::from(now.with_timezone(&offset).weekday())
    }

    /// Key for the day after `now`; Sunday wraps to Monday.
    pub fn tomorrow(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::from(now.with_timezone(&offset).weekday().succ())
    }

    /// The weekday this key names, if it names one.
    pub fn weekday(&self) -> Option<Weekday> {
        self.0.trim().parse().ok()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DayKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<Weekday> for DayKey {
    fn from(day: Weekday) -> Self {
        Self::from(weekday_name(day))
    }
}

/// Full English name of a weekday.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Keys from `days` that fall on or after `from` within the same week.
///
/// Keys that do not name a weekday are skipped.
pub fn remaining_days(days: &[DayKey], from: Weekday) -> Vec<DayKey> {
    let start = from.num_days_from_monday();
    days.iter()
        .filter(|key| {
            key.weekday()
                .is_some_and(|day| day.num_days_from_monday() >= start)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn today_uses_local_offset() {
        // 2026-10-18 20:00 UTC is Monday 05:00 in Korea.
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 20, 0, 0).unwrap();
        assert_eq!(DayKey::today(now, kst()).as_str(), "Monday");
        assert_eq!(
            DayKey::today(now, FixedOffset::east_opt(0).unwrap()).as_str(),
            "Sunday"
        );
    }

    #[test]
    fn tomorrow_wraps_sunday_to_monday() {
        let sunday_noon_kst = Utc.with_ymd_and_hms(2026, 10, 18, 3, 0, 0).unwrap();
        assert_eq!(DayKey::today(sunday_noon_kst, kst()).as_str(), "Sunday");
        assert_eq!(DayKey::tomorrow(sunday_noon_kst, kst()).as_str(), "Monday");
    }

    #[test]
    fn weekday_parses_full_names_only_when_valid() {
        assert_eq!(DayKey::from("Wednesday").weekday(), Some(Weekday::Wed));
        assert_eq!(DayKey::from("holiday-special").weekday(), None);
    }

    #[test]
    fn remaining_days_starts_at_current_weekday() {
        let week: Vec<DayKey> = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]
            .into_iter()
            .map(DayKey::from)
            .collect();

        let from_wed = remaining_days(&week, Weekday::Wed);
        assert_eq!(
            from_wed.iter().map(DayKey::as_str).collect::<Vec<_>>(),
            vec!["Wednesday", "Thursday", "Friday"]
        );
        assert!(remaining_days(&week, Weekday::Sat).is_empty());
    }
}
