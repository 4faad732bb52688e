//! Date normalization to the `DD.MM.YYYY` display form.
//!
//! Accepted inputs:
//! - RFC 3339 timestamps, with or without fractional seconds, `Z` or offset
//! - timestamps without a zone (read as UTC)
//! - bare calendar dates (`2025-02-13`)
//! - bare four-digit years, returned unchanged
//! - any of the above followed by the localized ` г.` suffix
//!
//! Anything else is returned unchanged and logged. Normalization never fails.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Localized year suffix some upstream systems append ("2025 г.").
const LOCALIZED_SUFFIX: &str = "г.";

const DISPLAY_FORMAT: &str = "%d.%m.%Y";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(T\d{2}:\d{2}:\d{2}|\s\d{2}:\d{2}:\d{2})\.\d+").expect("valid regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}$").expect("valid regex"))
}

/// Normalize an optional date string. Absent and empty both yield `""`.
pub fn normalize_date(input: Option<&str>) -> String {
    match input {
        Some(raw) => normalize_date_str(raw),
        None => String::new(),
    }
}

/// Normalize one date string; see the module docs for accepted forms.
pub fn normalize_date_str(raw: &str) -> String {
    let trimmed = raw.trim();
    let cleaned = trimmed
        .strip_suffix(LOCALIZED_SUFFIX)
        .map(str::trim_end)
        .unwrap_or(trimmed);

    if cleaned.is_empty() {
        return String::new();
    }
    if year_re().is_match(cleaned) {
        return cleaned.to_string();
    }

    match parse(cleaned) {
        Some(date) => date.format(DISPLAY_FORMAT).to_string(),
        None => {
            log::warn!("could not normalize date {raw:?}; keeping it as given");
            raw.to_string()
        }
    }
}

/// Calendar date of the input in its own zone; sub-second precision dropped.
fn parse(s: &str) -> Option<NaiveDate> {
    let whole_seconds = fraction_re().replace(s, "$1");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&whole_seconds) {
        return Some(dt.date_naive());
    }
    // ISO-8601 also allows a zoned timestamp without seconds.
    if let Ok(dt) = DateTime::parse_from_str(&whole_seconds, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.date_naive());
    }
    // No zone given: the timestamp is read as UTC.
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&whole_seconds, format) {
            return Some(naive.and_utc().date_naive());
        }
    }
    NaiveDate::parse_from_str(&whole_seconds, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_inputs() {
        let cases = [
            (Some("2025-02-13T17:10:17.02749+03:00"), "13.02.2025"),
            (Some("2025-02-13T17:10:17Z"), "13.02.2025"),
            (Some("2025-02-13"), "13.02.2025"),
            (Some("2025"), "2025"),
            (Some(""), ""),
            (None, ""),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_date(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn keeps_calendar_date_of_the_given_offset() {
        // 23:30 at +03:00 is still the 13th locally.
        assert_eq!(normalize_date_str("2025-02-13T23:30:00+03:00"), "13.02.2025");
        assert_eq!(normalize_date_str("2025-02-13T00:30:00-05:00"), "13.02.2025");
    }

    #[test]
    fn zoned_timestamp_without_seconds() {
        assert_eq!(normalize_date_str("2025-02-13T17:10+03:00"), "13.02.2025");
        assert_eq!(normalize_date_str("2025-02-13T23:50-05:00"), "13.02.2025");
    }

    #[test]
    fn zone_less_timestamps_are_accepted() {
        assert_eq!(normalize_date_str("2025-01-29T10:08:39.725"), "29.01.2025");
        assert_eq!(normalize_date_str("2025-01-29 10:08"), "29.01.2025");
    }

    #[test]
    fn strips_localized_suffix() {
        assert_eq!(normalize_date_str("2025-02-13 г."), "13.02.2025");
        assert_eq!(normalize_date_str("2025-02-13T17:10:17.02749+03:00 г."), "13.02.2025");
        assert_eq!(normalize_date_str("1998 г."), "1998");
    }

    #[test]
    fn unparsable_input_is_returned_unchanged() {
        assert_eq!(normalize_date_str("spring 2024"), "spring 2024");
        assert_eq!(normalize_date_str("2025-13-45"), "2025-13-45");
        assert_eq!(normalize_date_str("13.02.2025"), "13.02.2025");
    }
}
