//! TimeModel (spec.md §4.1): the primitives that hide whether an ICAL
//! value carried a `TZID` parameter, a trailing `Z`, or neither, so that
//! downstream codecs only ever see one tagged value.

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// A local date-time with no attached offset - the JSON-side `start`
/// value (spec.md §6: `YYYY-MM-DDThh:mm:ss`, no trailing `Z`, no offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalDateTime(pub NaiveDateTime);

impl LocalDateTime {
    pub fn parse(value: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
            .map(LocalDateTime)
            .map_err(|_| Error::invalid_ical(format!("invalid local date-time: {value:?}")))
    }

    pub fn format(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    pub fn add_signed_seconds(&self, seconds: i64) -> Self {
        LocalDateTime(self.0 + chrono::Duration::seconds(seconds))
    }

    /// Interprets this local value in `binding`, producing the UTC
    /// instant. A floating binding is interpreted as already-UTC, which
    /// is the only sound choice absent a viewer's zone (spec.md §9's open
    /// question on floating triggers: we never invent a default zone).
    pub fn to_utc(&self, binding: &TzBinding) -> chrono::DateTime<chrono::Utc> {
        match binding {
            TzBinding::Floating => chrono::Utc.from_utc_datetime(&self.0),
            TzBinding::Utc => chrono::Utc.from_utc_datetime(&self.0),
            TzBinding::Named(tz) => tz
                .from_local_datetime(&self.0)
                .single()
                .unwrap_or_else(|| tz.from_utc_datetime(&self.0))
                .with_timezone(&chrono::Utc),
        }
    }
}

/// A UTC instant - `created`/`updated`/`scheduleUpdated` (spec.md §6:
/// `YYYY-MM-DDThh:mm:ssZ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UtcDateTime(pub NaiveDateTime);

impl UtcDateTime {
    pub fn parse(value: &str) -> Result<Self> {
        let body = value
            .strip_suffix('Z')
            .ok_or_else(|| Error::invalid_ical(format!("UTC timestamp missing trailing Z: {value:?}")))?;

        NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S")
            .map(UtcDateTime)
            .map_err(|_| Error::invalid_ical(format!("invalid UTC date-time: {value:?}")))
    }

    pub fn format(&self) -> String {
        format!("{}Z", self.0.format("%Y-%m-%dT%H:%M:%S"))
    }

    pub fn now_placeholder(naive: NaiveDateTime) -> Self {
        UtcDateTime(naive)
    }

    pub fn to_local_in(&self, tz: &Tz) -> LocalDateTime {
        let utc = chrono::Utc.from_utc_datetime(&self.0);
        LocalDateTime(utc.with_timezone(tz).naive_local())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOnly(pub NaiveDate);

impl DateOnly {
    pub fn parse(value: &str) -> Result<Self> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(DateOnly)
            .map_err(|_| Error::invalid_ical(format!("invalid date: {value:?}")))
    }

    pub fn format(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

/// Whether a local date-time is floating, UTC, or bound to a named IANA
/// zone. `spec.md` §3's invariant ("timeZone and locations[*].rel=end
/// timezone are either both floating or both resolvable") is enforced by
/// comparing two `TzBinding`s for "floatiness" equivalence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzBinding {
    Floating,
    Named(Tz),
    Utc,
}

impl TzBinding {
    pub fn is_floating(&self) -> bool {
        matches!(self, TzBinding::Floating)
    }

    pub fn iana_name(&self) -> Option<&'static str> {
        match self {
            TzBinding::Named(tz) => Some(tz.name()),
            TzBinding::Utc => Some("UTC"),
            TzBinding::Floating => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_date_time_round_trips() {
        let ldt = LocalDateTime::parse("2024-03-10T09:00:00").unwrap();
        assert_eq!(ldt.format(), "2024-03-10T09:00:00");
    }

    #[test]
    fn utc_date_time_requires_trailing_z() {
        assert!(UtcDateTime::parse("2024-03-10T09:00:00").is_err());
        let utc = UtcDateTime::parse("2024-03-10T09:00:00Z").unwrap();
        assert_eq!(utc.format(), "2024-03-10T09:00:00Z");
    }

    #[test]
    fn floating_local_to_utc_is_identity() {
        let ldt = LocalDateTime::parse("2024-03-10T09:00:00").unwrap();
        let utc = ldt.to_utc(&TzBinding::Floating);
        assert_eq!(utc.naive_utc(), ldt.0);
    }

    #[test]
    fn named_binding_converts_through_the_zone() {
        let ldt = LocalDateTime::parse("2024-03-10T09:00:00").unwrap();
        let utc = ldt.to_utc(&TzBinding::Named(chrono_tz::Europe::Berlin));
        // Berlin is UTC+1 in March before the DST switch on 2024-03-31.
        assert_eq!(utc.naive_utc(), NaiveDateTime::parse_from_str("2024-03-10T08:00:00", "%Y-%m-%dT%H:%M:%S").unwrap());
    }
}
