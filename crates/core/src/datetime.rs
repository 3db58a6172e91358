//! Canonical wire formats for dates and timestamps. All values are UTC.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Precision used when a timestamp appears inside a search filter.
const FILTER_DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

pub fn format_date(value: Date) -> String {
    value.format(DATE_FORMAT).unwrap_or_default()
}

pub fn format_datetime(value: PrimitiveDateTime) -> String {
    value.format(DATETIME_FORMAT).unwrap_or_default()
}

pub fn format_filter_datetime(value: PrimitiveDateTime) -> String {
    value.format(FILTER_DATETIME_FORMAT).unwrap_or_default()
}

/// Returns `None` for anything that is not `yyyy-MM-dd`.
pub fn parse_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), DATE_FORMAT).ok()
}

/// Accepts `yyyy-MM-dd HH:mm:ss`, falling back to minute precision.
pub fn parse_datetime(value: &str) -> Option<PrimitiveDateTime> {
    let value = value.trim();
    PrimitiveDateTime::parse(value, DATETIME_FORMAT)
        .or_else(|_| PrimitiveDateTime::parse(value, FILTER_DATETIME_FORMAT))
        .ok()
}
