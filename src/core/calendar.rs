//! Month boundary arithmetic in an arbitrary time zone.

use crate::errors::{Error, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone};

/// 00:00:00 on the first day of the month containing `now`, in `now`'s zone.
pub fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).ok_or_else(|| {
        Error::Schedule {
            message: format!("no first day for {}-{:02}", now.year(), now.month()),
        }
    })?;
    local_midnight(&now.timezone(), first)
}

/// 00:00:00 on the first day of the month after the one containing `now`.
pub fn next_month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    let next = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .ok_or_else(|| Error::Schedule {
            message: format!("no month after {}-{:02}", now.year(), now.month()),
        })?;
    local_midnight(&now.timezone(), next)
}

/// Resolves local midnight of `date`. Where a DST transition skips midnight,
/// the first instant of the day that does exist is used instead.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + TimeDelta::hours(1))).earliest())
        .ok_or_else(|| Error::Schedule {
            message: format!("local midnight of {date} does not exist"),
        })
}
