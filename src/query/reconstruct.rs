//! Time bucket reconstruction
//!
//! Time-grouped queries retrieve one column per calendar component (year,
//! month, day...). Rows are rewritten so those trailing columns collapse into
//! a single timestamp in the user's timezone.

use crate::provider::{ProviderError, ProviderResult, ResultSet, Row, Value};
use crate::time::UserTimezone;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

/// Rewrites rows lazily, keeping the wrapped result's total
pub struct DatetimeRows {
    inner: ResultSet,
    index: usize,
    timezone: UserTimezone,
}

impl DatetimeRows {
    /// Wrap `results`, collapsing columns from `index` onward
    pub fn wrap(results: ResultSet, index: usize, timezone: UserTimezone) -> ResultSet {
        let total = results.total();
        ResultSet::new(
            Self {
                inner: results,
                index,
                timezone,
            },
            total,
        )
    }
}

impl Iterator for DatetimeRows {
    type Item = ProviderResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        Some(row.and_then(|row| rebuild_row(row, self.index, &self.timezone)))
    }
}

/// Replace `row[index..]` with the timestamp those components describe
pub fn rebuild_row(mut row: Row, index: usize, timezone: &UserTimezone) -> ProviderResult<Row> {
    if index >= row.len() {
        return Err(ProviderError::MalformedRow(format!(
            "expected date components from column {}, row has {} columns",
            index,
            row.len()
        )));
    }

    let components = row
        .split_off(index)
        .iter()
        .map(|value| {
            value.as_integer().ok_or_else(|| {
                ProviderError::MalformedRow(format!("date component is not an integer: {:?}", value))
            })
        })
        .collect::<ProviderResult<Vec<i64>>>()?;

    row.push(Value::DateTime(datetime_from_components(&components, timezone)?));
    Ok(row)
}

/// Build a timestamp from `[year, month?, day?, hour?, minute?, second?]`
///
/// Missing month and day default to 1, missing time components to 0. The
/// components are read as local time in `timezone`.
pub fn datetime_from_components(
    components: &[i64],
    timezone: &UserTimezone,
) -> ProviderResult<DateTime<FixedOffset>> {
    let malformed = || {
        ProviderError::MalformedRow(format!("invalid date components: {:?}", components))
    };

    if components.is_empty() || components.len() > 6 {
        return Err(malformed());
    }

    let part = |i: usize, default: i64| components.get(i).copied().unwrap_or(default);
    let unsigned = |v: i64| u32::try_from(v).ok();

    let year = i32::try_from(part(0, 0)).map_err(|_| malformed())?;
    let date = NaiveDate::from_ymd_opt(
        year,
        unsigned(part(1, 1)).ok_or_else(malformed)?,
        unsigned(part(2, 1)).ok_or_else(malformed)?,
    )
    .ok_or_else(malformed)?;
    let time = NaiveTime::from_hms_opt(
        unsigned(part(3, 0)).ok_or_else(malformed)?,
        unsigned(part(4, 0)).ok_or_else(malformed)?,
        unsigned(part(5, 0)).ok_or_else(malformed)?,
    )
    .ok_or_else(malformed)?;

    timezone.from_local(&date.and_time(time)).ok_or_else(malformed)
}
