// Types and utilities for manipulating timestamps from the cluster's log sources.
//
// Three time formats occur in the wild:
//
//  - the driver log and the worker controller log lead every line with the log4j pattern
//    "yy/MM/dd HH:mm:ss", where the seconds may carry a ",SSS" millisecond field
//  - the sar telemetry log carries a bare time-of-day "hh:mm:ss AM/PM" and no date at all
//
// Everything is normalized to a single comparable representation here.  Time-of-day-only sources
// are resolved against a caller-supplied reference date; a single telemetry file must not span a
// midnight boundary.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

pub fn epoch() -> Timestamp {
    // any time before any log record
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

pub fn now() -> Timestamp {
    Utc::now()
}

pub fn far_future() -> Timestamp {
    // any time after any log record
    Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()
}

pub fn timestamp_from_ymd(y: i32, mo: u32, d: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
}

pub fn timestamp_from_ymdhms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// The date assumed for time-of-day-only log sources when the configuration does not provide one.

pub fn default_reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 1, 1).unwrap()
}

/// Parse the leading date and time fields of a driver or worker log line, eg "16/03/14" and
/// "18:45:12" or "18:45:12,328".  log4j separates the millisecond field with a comma; a dot is
/// accepted too.

pub fn parse_log_timestamp(date_field: &str, time_field: &str) -> Result<Timestamp> {
    let Ok(date) = NaiveDate::parse_from_str(date_field, "%y/%m/%d") else {
        bail!("Invalid log date {date_field}")
    };
    let normalized = time_field.replace(',', ".");
    let Ok(time) = NaiveTime::parse_from_str(&normalized, "%H:%M:%S%.f") else {
        bail!("Invalid log time {time_field}")
    };
    Ok(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

/// Parse a sar time-of-day field such as "06:45:01 PM" against a fixed reference date.

pub fn parse_clock_time(field: &str, reference: NaiveDate) -> Result<Timestamp> {
    let Ok(time) = NaiveTime::parse_from_str(field, "%I:%M:%S %p") else {
        bail!("Invalid clock time {field}")
    };
    Ok(Utc.from_utc_datetime(&NaiveDateTime::new(reference, time)))
}

#[test]
fn test_parse_log_timestamp() {
    assert!(
        parse_log_timestamp("16/03/14", "18:45:12").unwrap()
            == timestamp_from_ymdhms(2016, 3, 14, 18, 45, 12)
    );
    // Millisecond field, comma or dot separated
    let t = parse_log_timestamp("16/03/14", "18:45:12,328").unwrap();
    assert!(t - timestamp_from_ymdhms(2016, 3, 14, 18, 45, 12) == chrono::Duration::milliseconds(328));
    assert!(parse_log_timestamp("16/03/14", "18:45:12.328").unwrap() == t);
    assert!(parse_log_timestamp("2016-03-14", "18:45:12").is_err());
    assert!(parse_log_timestamp("16/03/14", "18:45").is_err());
}

#[test]
fn test_parse_clock_time() {
    let reference = NaiveDate::from_ymd_opt(2016, 3, 14).unwrap();
    assert!(
        parse_clock_time("06:45:11 PM", reference).unwrap()
            == timestamp_from_ymdhms(2016, 3, 14, 18, 45, 11)
    );
    assert!(
        parse_clock_time("12:00:01 AM", reference).unwrap()
            == timestamp_from_ymdhms(2016, 3, 14, 0, 0, 1)
    );
    assert!(parse_clock_time("18:45:11", reference).is_err());
}
