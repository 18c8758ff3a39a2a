//! DATE and DATE-TIME value data types (RFC 5545 §3.3.4/§3.3.5), the ICAL
//! wire form: `YYYYMMDD` and `YYYYMMDD"T"HHMMSS["Z"]`. `jevent_core::time`
//! binds these to a `TzBinding` (floating/named/UTC); this module only
//! knows the wire text, not the zone.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ValueError, ValueResult};

pub fn parse_date(value: &str) -> ValueResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| ValueError::new(value, "invalid DATE value, expected YYYYMMDD"))
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parses a DATE-TIME value, stripping a trailing `Z` if present and
/// reporting whether one was found (the UTC-vs-local discriminant the
/// caller uses to choose a `TzBinding`).
pub fn parse_date_time(value: &str) -> ValueResult<(NaiveDateTime, bool)> {
    let (body, is_utc) = match value.strip_suffix('Z') {
        Some(body) => (body, true),
        None => (value, false),
    };

    let parsed = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S")
        .map_err(|_| ValueError::new(value, "invalid DATE-TIME value, expected YYYYMMDDTHHMMSS[Z]"))?;

    Ok((parsed, is_utc))
}

pub fn format_date_time(date_time: &NaiveDateTime, utc: bool) -> String {
    let base = date_time.format("%Y%m%dT%H%M%S").to_string();
    if utc {
        format!("{base}Z")
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_floating_date_time() {
        let (dt, is_utc) = parse_date_time("20240310T090000").unwrap();
        assert!(!is_utc);
        assert_eq!(format_date_time(&dt, false), "20240310T090000");
    }

    #[test]
    fn parses_utc_date_time() {
        let (dt, is_utc) = parse_date_time("20240310T090000Z").unwrap();
        assert!(is_utc);
        assert_eq!(format_date_time(&dt, true), "20240310T090000Z");
    }

    #[test]
    fn parses_date_only() {
        let date = parse_date("20240101").unwrap();
        assert_eq!(format_date(&date), "20240101");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_date_time("not-a-date").is_err());
    }
}
