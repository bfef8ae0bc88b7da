//! Local calendar periods for the daily and monthly quota windows.

use chrono::{DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, Offset, TimeDelta, Utc};

/// Local day and month a moment falls in, with the instants they end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPeriod {
    pub day: NaiveDate,
    /// First day of the local month
    pub month: NaiveDate,
    /// Next local midnight
    pub day_resets_at: DateTime<Utc>,
    /// Local midnight on the first of next month
    pub month_resets_at: DateTime<Utc>,
}

impl LocalPeriod {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let day = now.with_timezone(&offset).date_naive();
        let month = day - Days::new(u64::from(day.day0()));

        Self {
            day,
            month,
            day_resets_at: local_midnight(day + Days::new(1), offset),
            month_resets_at: local_midnight(month + Months::new(1), offset),
        }
    }
}

/// Offset from a count of minutes east of UTC, or UTC if out of range
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_utc_period() {
        let period = LocalPeriod::at(utc(2025, 3, 14, 15, 9), offset_from_minutes(0));
        assert_eq!(period.day, date(2025, 3, 14));
        assert_eq!(period.month, date(2025, 3, 1));
        assert_eq!(period.day_resets_at, utc(2025, 3, 15, 0, 0));
        assert_eq!(period.month_resets_at, utc(2025, 4, 1, 0, 0));
    }

    #[test]
    fn test_negative_offset_keeps_previous_local_day() {
        // 02:00 UTC on the 1st is still the last evening of the previous month at UTC-5
        let period = LocalPeriod::at(utc(2025, 4, 1, 2, 0), offset_from_minutes(-300));
        assert_eq!(period.day, date(2025, 3, 31));
        assert_eq!(period.month, date(2025, 3, 1));
        assert_eq!(period.day_resets_at, utc(2025, 4, 1, 5, 0));
        assert_eq!(period.month_resets_at, utc(2025, 4, 1, 5, 0));
    }

    #[test]
    fn test_positive_offset_and_year_rollover() {
        // 23:30 UTC on Dec 31 is already New Year's Day at UTC+1
        let period = LocalPeriod::at(utc(2025, 12, 31, 23, 30), offset_from_minutes(60));
        assert_eq!(period.day, date(2026, 1, 1));
        assert_eq!(period.month, date(2026, 1, 1));
        assert_eq!(period.day_resets_at, utc(2026, 1, 1, 23, 0));
        assert_eq!(period.month_resets_at, utc(2026, 1, 31, 23, 0));
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        assert_eq!(offset_from_minutes(100_000).local_minus_utc(), 0);
    }
}
