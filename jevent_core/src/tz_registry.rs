//! TzRegistry (spec.md §4.2): IANA timezone lookup plus bounded VTIMEZONE
//! emission. The registry itself is immutable after construction - the
//! "process-wide read-only registry" spec.md §5 describes - so a single
//! `TzRegistry::new()` can be shared freely across concurrent encode
//! calls.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use std::str::FromStr;

use jevent_ical::tree::{Component, Property};

use crate::error::{Error, Result};

/// How far past a bounded span's end (or, for an unbounded/"eternity"
/// recurrence, past its start) the registry will scan for offset
/// transitions before giving up. Keeps VTIMEZONE emission O(days in span)
/// rather than walking forever.
const MAX_SCAN_DAYS: i64 = 760;

#[derive(Debug, Default)]
pub struct TzRegistry;

impl TzRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Resolves an IANA name, accepting the `Etc/UTC` alias spec.md §4.2
    /// names explicitly in addition to the bare `UTC` zone.
    pub fn lookup(&self, name: &str) -> Result<Tz> {
        if name.eq_ignore_ascii_case("UTC") || name.eq_ignore_ascii_case("Etc/UTC") {
            return Ok(Tz::UTC);
        }

        Tz::from_str(name).map_err(|_| Error::invalid_ical(format!("unknown time zone: {name:?}")))
    }

    /// Emits a `VTIMEZONE` component truncated to `[span_start, span_end]`
    /// (spec.md §4.8's span computation feeds this). Walks the span day
    /// by day looking for UTC-offset transitions and emits one
    /// STANDARD/DAYLIGHT sub-component per distinct offset observed, each
    /// anchored at the first instant it was observed - a bounded
    /// approximation of the zone's real transition rules, adequate for
    /// the window a single event's occurrences fall within.
    pub fn emit_vtimezone(&self, tzid: &str, tz: Tz, span_start: NaiveDateTime, span_end: NaiveDateTime) -> Component {
        let mut vtimezone = Component::new("VTIMEZONE");
        vtimezone.push_property(Property::new("TZID", tzid));

        let scan_end = span_end.min(span_start + chrono::Duration::days(MAX_SCAN_DAYS));

        let mut cursor = span_start;
        let mut previous_offset = tz.offset_from_utc_datetime(&cursor);

        self.push_transition(&mut vtimezone, tzid, &previous_offset, &previous_offset, cursor);

        while cursor < scan_end {
            cursor += chrono::Duration::days(1);
            let offset = tz.offset_from_utc_datetime(&cursor);

            if offset.base_utc_offset() != previous_offset.base_utc_offset()
                || offset.dst_offset() != previous_offset.dst_offset()
            {
                self.push_transition(&mut vtimezone, tzid, &previous_offset, &offset, cursor);
                previous_offset = offset;
            }
        }

        vtimezone
    }

    fn push_transition(
        &self,
        vtimezone: &mut Component,
        _tzid: &str,
        from: &<Tz as TimeZone>::Offset,
        to: &<Tz as TimeZone>::Offset,
        at: NaiveDateTime,
    ) {
        let sub_name = if to.dst_offset().num_seconds() != 0 {
            "DAYLIGHT"
        } else {
            "STANDARD"
        };

        let mut sub = Component::new(sub_name);
        sub.push_property(Property::new("DTSTART", jevent_ical::values::date_time::format_date_time(&at, false)));
        sub.push_property(Property::new("TZOFFSETFROM", format_utc_offset(from.base_utc_offset() + from.dst_offset())));
        sub.push_property(Property::new("TZOFFSETTO", format_utc_offset(to.base_utc_offset() + to.dst_offset())));

        vtimezone.push_component(sub);
    }
}

fn format_utc_offset(offset: chrono::Duration) -> String {
    let total_seconds = offset.num_seconds();
    let sign = if total_seconds < 0 { "-" } else { "+" };
    let total_seconds = total_seconds.abs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if seconds == 0 {
        format!("{sign}{hours:02}{minutes:02}")
    } else {
        format!("{sign}{hours:02}{minutes:02}{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_utc_alias() {
        let registry = TzRegistry::new();
        assert_eq!(registry.lookup("Etc/UTC").unwrap(), Tz::UTC);
        assert_eq!(registry.lookup("UTC").unwrap(), Tz::UTC);
    }

    #[test]
    fn rejects_unknown_zone() {
        let registry = TzRegistry::new();
        assert!(registry.lookup("Imaginary/Place").is_err());
    }

    #[test]
    fn emits_truncated_vtimezone_for_berlin_spring() {
        let registry = TzRegistry::new();
        let tz = registry.lookup("Europe/Berlin").unwrap();
        let start = NaiveDateTime::parse_from_str("2024-03-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let end = NaiveDateTime::parse_from_str("2024-04-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();

        let vtimezone = registry.emit_vtimezone("Europe/Berlin", tz, start, end);
        assert_eq!(vtimezone.property("TZID").unwrap().value, "Europe/Berlin");
        assert!(vtimezone.components.len() >= 2, "expected at least the initial offset plus the spring-forward transition");
    }
}
