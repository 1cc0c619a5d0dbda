//! Time units, windows and timezones
//!
//! - `TimeUnit`: the temporal grouping units, ordered coarsest first
//! - `Step`: a bucket width (unit × count) used for charts and drill-down windows
//! - `TimeRange`: a half-open time window in milliseconds
//! - `UserTimezone`: a fixed offset or a named IANA zone with its DST rules
//! - `parse_timezone`: user timezone strings to `UserTimezone`

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Temporal grouping units, ordered from the coarsest to the finest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl TimeUnit {
    /// All units, coarsest first
    pub const ALL: [TimeUnit; 5] = [
        TimeUnit::Year,
        TimeUnit::Month,
        TimeUnit::Day,
        TimeUnit::Hour,
        TimeUnit::Minute,
    ];

    /// Parse a grouping name. Matching is exact: `Day` is a field, not a unit.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            "hour" => Some(Self::Hour),
            "minute" => Some(Self::Minute),
            _ => None,
        }
    }

    /// Whether a grouping field name denotes a temporal unit
    pub fn is_temporal(name: &str) -> bool {
        Self::from_str(name).is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }

    /// Unit name used in backend truncation paths
    pub fn db_unit(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "mday",
            Self::Hour => "hour",
            Self::Minute => "min",
        }
    }

    /// Inverse of [`TimeUnit::db_unit`]
    pub fn from_db_unit(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.db_unit() == s)
    }

    /// Number of date components needed to express a bucket of this unit
    pub fn precision(&self) -> usize {
        *self as usize + 1
    }

    /// Units from year down to and including `self`
    pub fn cascade(self) -> impl Iterator<Item = TimeUnit> {
        Self::ALL.into_iter().take(self.precision())
    }

    /// The calendar component this unit extracts from a timestamp
    pub fn component<T: TimeZone>(&self, dt: &DateTime<T>) -> i64 {
        match self {
            Self::Year => dt.year() as i64,
            Self::Month => dt.month() as i64,
            Self::Day => dt.day() as i64,
            Self::Hour => dt.hour() as i64,
            Self::Minute => dt.minute() as i64,
        }
    }

    /// Truncate a timestamp to the start of its bucket in `tz`
    ///
    /// The result carries the offset in force at the bucket start, which may
    /// differ from the input's across a DST change.
    pub fn truncate(&self, dt: DateTime<FixedOffset>, tz: &UserTimezone) -> DateTime<FixedOffset> {
        let local = tz.to_local(&dt).naive_local();

        let date = match self {
            Self::Year => NaiveDate::from_ymd_opt(local.year(), 1, 1),
            Self::Month => NaiveDate::from_ymd_opt(local.year(), local.month(), 1),
            _ => Some(local.date()),
        };

        let time = match self {
            Self::Year | Self::Month | Self::Day => NaiveTime::from_hms_opt(0, 0, 0),
            Self::Hour => NaiveTime::from_hms_opt(local.hour(), 0, 0),
            Self::Minute => NaiveTime::from_hms_opt(local.hour(), local.minute(), 0),
        };

        match (date, time) {
            (Some(d), Some(t)) => tz.from_local(&d.and_time(t)).unwrap_or(dt),
            _ => dt,
        }
    }

    /// Move a timestamp forward by `count` units
    ///
    /// Days, months and years follow the wall clock of `tz`; hours and
    /// minutes are exact durations.
    pub fn advance(
        &self,
        dt: DateTime<FixedOffset>,
        count: u32,
        tz: &UserTimezone,
    ) -> Option<DateTime<FixedOffset>> {
        let local = tz.to_local(&dt).naive_local();
        match self {
            Self::Year => tz.from_local(&local.checked_add_months(Months::new(count.checked_mul(12)?))?),
            Self::Month => tz.from_local(&local.checked_add_months(Months::new(count))?),
            Self::Day => tz.from_local(&local.checked_add_signed(Duration::days(count as i64))?),
            Self::Hour => dt.checked_add_signed(Duration::hours(count as i64)),
            Self::Minute => dt.checked_add_signed(Duration::minutes(count as i64)),
        }
    }

    /// Approximate bucket width in seconds (months are 30 days, years 365)
    pub fn approx_duration_secs(&self) -> i64 {
        match self {
            Self::Year => 365 * 24 * 3600,
            Self::Month => 30 * 24 * 3600,
            Self::Day => 24 * 3600,
            Self::Hour => 3600,
            Self::Minute => 60,
        }
    }

    /// strftime format for chart labels of this unit
    pub fn label_format(&self) -> &'static str {
        match self {
            Self::Year => "%Y",
            Self::Month => "%Y-%m",
            Self::Day => "%Y-%m-%d",
            Self::Hour => "%Y-%m-%d %H:00",
            Self::Minute => "%Y-%m-%d %H:%M",
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A bucket width: `count` consecutive `unit`s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub unit: TimeUnit,
    pub count: u32,
}

impl Step {
    pub fn new(unit: TimeUnit, count: u32) -> Self {
        Self { unit, count }
    }

    /// Finest single-unit step that keeps `range` within `max_buckets` buckets
    pub fn for_range(range: &TimeRange, max_buckets: i64) -> Self {
        let secs = range.duration_secs().max(1);

        let unit = TimeUnit::ALL
            .into_iter()
            .rev()
            .find(|u| secs / u.approx_duration_secs() <= max_buckets)
            .unwrap_or(TimeUnit::Year);

        Self::new(unit, 1)
    }

    /// Inclusive end of the bucket starting at `start`: next bucket start minus one second
    pub fn bucket_end(
        &self,
        start: DateTime<FixedOffset>,
        tz: &UserTimezone,
    ) -> Option<DateTime<FixedOffset>> {
        let next = self.unit.advance(start, self.count, tz)?;
        next.checked_sub_signed(Duration::seconds(1))
    }
}

/// Time range for queries (half-open interval: [start, end))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range, returning None if start >= end
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a range between two instants
    pub fn between<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Option<Self> {
        Self::try_new(start.timestamp_millis(), end.timestamp_millis())
    }

    /// Create a range for the last N hours from now; huge spans clamp to the earliest instant
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        let start = end.saturating_sub(hours.saturating_mul(3600 * 1000));
        Self { start, end }
    }

    /// Create a range for the last N days from now
    pub fn last_days(days: i64) -> Self {
        Self::last_hours(days.saturating_mul(24))
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Get the duration in seconds
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start) / 1000
    }

    pub fn start_in(&self, tz: &UserTimezone) -> Option<DateTime<FixedOffset>> {
        tz.timestamp_millis_opt(self.start)
    }

    pub fn end_in(&self, tz: &UserTimezone) -> Option<DateTime<FixedOffset>> {
        tz.timestamp_millis_opt(self.end)
    }
}

/// The timezone a user sees dates in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimezone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl UserTimezone {
    pub fn utc() -> Self {
        Self::Named(Tz::UTC)
    }

    /// Offset in force at a UTC instant
    pub fn offset_at(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            Self::Fixed(offset) => *offset,
            Self::Named(tz) => tz.offset_from_utc_datetime(utc).fix(),
        }
    }

    /// The same instant, expressed in this timezone
    pub fn to_local<T: TimeZone>(&self, dt: &DateTime<T>) -> DateTime<FixedOffset> {
        let utc = dt.naive_utc();
        self.offset_at(&utc).from_utc_datetime(&utc)
    }

    /// Resolve a wall-clock time
    ///
    /// An ambiguous time takes its earlier instant. A time skipped by a DST
    /// jump resolves one hour later.
    pub fn from_local(&self, local: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Fixed(offset) => offset.from_local_datetime(local).single(),
            Self::Named(tz) => tz
                .from_local_datetime(local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(*local + Duration::hours(1))).earliest())
                .map(|dt| self.to_local(&dt)),
        }
    }

    pub fn timestamp_millis_opt(&self, millis: i64) -> Option<DateTime<FixedOffset>> {
        Utc.timestamp_millis_opt(millis).single().map(|dt| self.to_local(&dt))
    }

    pub fn with_ymd_and_hms(
        &self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<DateTime<FixedOffset>> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        self.from_local(&date.and_hms_opt(hour, min, sec)?)
    }
}

impl From<FixedOffset> for UserTimezone {
    fn from(offset: FixedOffset) -> Self {
        Self::Fixed(offset)
    }
}

impl From<Tz> for UserTimezone {
    fn from(tz: Tz) -> Self {
        Self::Named(tz)
    }
}

impl std::fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(offset) => write!(f, "{}", offset),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Parse a user timezone: `UTC`, `Z`, `+HH:MM`, `-HHMM`, `+HH` or an IANA name such as `Europe/Paris`
pub fn parse_timezone(s: &str) -> Option<UserTimezone> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Some(UserTimezone::utc());
    }

    match s.as_bytes().first()? {
        b'+' | b'-' => parse_offset(s).map(UserTimezone::Fixed),
        _ => s.parse::<Tz>().ok().map(UserTimezone::Named),
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };

    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tz(s: &str) -> UserTimezone {
        parse_timezone(s).unwrap()
    }

    fn offset(secs: i32) -> FixedOffset {
        FixedOffset::east_opt(secs).unwrap()
    }

    #[test]
    fn test_unit_cascade() {
        let units: Vec<_> = TimeUnit::Day.cascade().collect();
        assert_eq!(units, vec![TimeUnit::Year, TimeUnit::Month, TimeUnit::Day]);

        assert_eq!(TimeUnit::Year.cascade().count(), 1);
        assert_eq!(TimeUnit::Minute.cascade().count(), 5);
    }

    #[test]
    fn test_unit_parse_is_exact() {
        assert_eq!(TimeUnit::from_str("hour"), Some(TimeUnit::Hour));
        assert_eq!(TimeUnit::from_str("Hour"), None);
        assert!(!TimeUnit::is_temporal("severity"));
        assert_eq!(TimeUnit::from_db_unit("mday"), Some(TimeUnit::Day));
    }

    #[test]
    fn test_truncate_in_offset() {
        let plus2 = tz("+02:00");
        let dt = plus2.with_ymd_and_hms(2024, 1, 15, 14, 35, 42).unwrap();

        assert_eq!(
            TimeUnit::Hour.truncate(dt, &plus2),
            plus2.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );
        assert_eq!(
            TimeUnit::Month.truncate(dt, &plus2),
            plus2.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            TimeUnit::Year.truncate(dt, &plus2),
            plus2.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );

        // 23:30 UTC is already the next day two hours east
        let late = tz("UTC").with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        assert_eq!(
            TimeUnit::Day.truncate(late, &plus2),
            plus2.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_truncate_across_dst() {
        let paris = tz("Europe/Paris");
        // summer time starts at 02:00 on 2024-03-31
        let noon = paris.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(noon.offset(), &offset(7200));

        let midnight = TimeUnit::Day.truncate(noon, &paris);
        assert_eq!(midnight.naive_local().to_string(), "2024-03-31 00:00:00");
        assert_eq!(midnight.offset(), &offset(3600));
    }

    #[test]
    fn test_step_bucket_end() {
        let utc = tz("UTC");
        let start = utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let end = Step::new(TimeUnit::Month, 1).bucket_end(start, &utc).unwrap();
        assert_eq!(end, utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());

        let end = Step::new(TimeUnit::Hour, 2).bucket_end(start, &utc).unwrap();
        assert_eq!(end, utc.with_ymd_and_hms(2024, 2, 1, 1, 59, 59).unwrap());
    }

    #[test]
    fn test_day_bucket_on_dst_change() {
        let paris = tz("Europe/Paris");
        let start = paris.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();

        let end = Step::new(TimeUnit::Day, 1).bucket_end(start, &paris).unwrap();
        assert_eq!(end, paris.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap());
        assert_eq!(end.timestamp() - start.timestamp(), 23 * 3600 - 1);
    }

    #[test]
    fn test_local_time_in_gap() {
        let paris = tz("Europe/Paris");
        let skipped = paris.with_ymd_and_hms(2024, 3, 31, 2, 30, 0).unwrap();
        assert_eq!(skipped.naive_local().to_string(), "2024-03-31 03:30:00");

        // 02:30 happens twice on 2024-10-27, the first one is kept
        let repeated = paris.with_ymd_and_hms(2024, 10, 27, 2, 30, 0).unwrap();
        assert_eq!(repeated.offset(), &offset(7200));
    }

    #[test]
    fn test_step_for_range() {
        let day = TimeRange::try_new(0, 24 * 3600 * 1000).unwrap();
        assert_eq!(Step::for_range(&day, 100).unit, TimeUnit::Hour);

        let month = TimeRange::try_new(0, 30 * 24 * 3600 * 1000).unwrap();
        assert_eq!(Step::for_range(&month, 100).unit, TimeUnit::Day);
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::try_new(1000, 2000).unwrap();

        assert!(!range.contains(999));
        assert!(range.contains(1000));
        assert!(range.contains(1999));
        assert!(!range.contains(2000));
        assert!(TimeRange::try_new(2000, 1000).is_none());
    }

    #[test]
    fn test_huge_window_saturates() {
        let range = TimeRange::last_hours(i64::MAX);
        assert!(range.start < 0 && range.start < range.end);

        let range = TimeRange::last_days(i64::MAX / 2);
        assert!(range.start < range.end);
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(tz("UTC"), UserTimezone::utc());
        assert_eq!(tz("Z"), UserTimezone::utc());
        assert_eq!(tz("+02:00"), UserTimezone::Fixed(offset(7200)));
        assert_eq!(tz("-0530"), UserTimezone::Fixed(offset(-(5 * 3600 + 30 * 60))));
        assert_eq!(tz("+09"), UserTimezone::Fixed(offset(9 * 3600)));
        assert_eq!(tz("Europe/Paris"), UserTimezone::Named(Tz::Europe__Paris));
        assert_eq!(tz("Europe/Paris").to_string(), "Europe/Paris");
        assert!(parse_timezone("Mars/Olympus").is_none());
        assert!(parse_timezone("+25:00").is_none());
    }
}
