//! Display formatting shared by all message templates.
//!
//! Dates arrive in whatever shape the caller had at hand: RFC 3339 strings
//! from the API, values from the order table, or text that an upstream
//! service already formatted. Text that already matches the display pattern
//! is passed through untouched.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Placeholder for any missing optional field.
pub const NOT_SPECIFIED: &str = "Не указано";

/// Default equipment direction when the order doesn't name one.
pub const DEFAULT_EQUIPMENT: &str = "БТ";

const DISPLAY_DATE: &str = "%d.%m.%Y";
const DISPLAY_DATETIME: &str = "%d.%m.%Y, %H:%M";

/// Format a timestamp-like value as `DD.MM.YYYY, HH:MM` in `tz`.
pub fn display_datetime(raw: &str, tz: Tz) -> String {
    let raw = raw.trim();
    if is_display_datetime(raw) || is_display_date(raw) {
        return raw.to_string();
    }
    if let Some(instant) = parse_instant(raw) {
        return instant.with_timezone(&tz).format(DISPLAY_DATETIME).to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format(DISPLAY_DATE).to_string();
    }
    raw.to_string()
}

/// Format a date-like value as `DD.MM.YYYY` in `tz`.
pub fn display_date(raw: &str, tz: Tz) -> String {
    let raw = raw.trim();
    if is_display_date(raw) || is_display_datetime(raw) {
        return raw.to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format(DISPLAY_DATE).to_string();
    }
    if let Some(instant) = parse_instant(raw) {
        return instant.with_timezone(&tz).format(DISPLAY_DATE).to_string();
    }
    raw.to_string()
}

fn is_display_datetime(s: &str) -> bool {
    s.len() == "DD.MM.YYYY, HH:MM".len()
        && NaiveDateTime::parse_from_str(s, DISPLAY_DATETIME).is_ok()
}

fn is_display_date(s: &str) -> bool {
    s.len() == "DD.MM.YYYY".len() && NaiveDate::parse_from_str(s, DISPLAY_DATE).is_ok()
}

/// Parse RFC 3339, or a naive ISO timestamp interpreted as UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped value or the placeholder.
pub fn or_placeholder(value: Option<&str>) -> String {
    or_default(value, NOT_SPECIFIED)
}

/// Escaped value or a caller-chosen default.
pub fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => escape_html(v),
        None => default.to_string(),
    }
}
