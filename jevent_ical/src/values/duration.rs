//! DURATION value data type (RFC 5545 §3.3.6), reused verbatim as the
//! ISO-8601 duration spec.md §6 requires on the JSON side.
//!
//! ```text
//! dur-value  = (["+"] / "-") "P" (dur-date / dur-time / dur-week)
//! dur-date   = dur-day [dur-time]
//! dur-time   = "T" (dur-hour / dur-minute / dur-second)
//! dur-week   = 1*DIGIT "W"
//! ```
//!
//! Only weeks, or days/hours/minutes/seconds, may be combined - never both
//! in the same value. `P0D` is the canonical zero duration (spec.md §6).

use crate::error::{ValueError, ValueResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Duration {
    pub negative: bool,
    pub weeks: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration {
        negative: false,
        weeks: 0,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    pub fn from_signed_seconds(total_seconds: i64) -> Self {
        let negative = total_seconds < 0;
        let mut remaining = total_seconds.unsigned_abs();

        let days = remaining / 86_400;
        remaining %= 86_400;
        let hours = remaining / 3_600;
        remaining %= 3_600;
        let minutes = remaining / 60;
        let seconds = remaining % 60;

        Duration {
            negative,
            weeks: 0,
            days,
            hours,
            minutes,
            seconds,
        }
    }

    pub fn to_signed_seconds(&self) -> i64 {
        let magnitude = (self.weeks * 7 + self.days) as i64 * 86_400
            + self.hours as i64 * 3_600
            + self.minutes as i64 * 60
            + self.seconds as i64;

        if self.negative { -magnitude } else { magnitude }
    }

    /// True when the duration has no day/week component (used to validate
    /// the "isAllDay implies a date-only start" invariant in reverse: an
    /// all-day duration must carry no time component).
    pub fn has_time_component(&self) -> bool {
        self.hours != 0 || self.minutes != 0 || self.seconds != 0
    }

    pub fn is_zero(&self) -> bool {
        self.weeks == 0 && self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    pub fn parse(value: &str) -> ValueResult<Self> {
        let original = value;
        let mut rest = value;

        let negative = if let Some(stripped) = rest.strip_prefix('-') {
            rest = stripped;
            true
        } else if let Some(stripped) = rest.strip_prefix('+') {
            rest = stripped;
            false
        } else {
            false
        };

        let rest = rest
            .strip_prefix('P')
            .ok_or_else(|| ValueError::new(original, "duration must start with P"))?;

        if let Some(weeks_str) = rest.strip_suffix('W') {
            let weeks = weeks_str
                .parse::<u64>()
                .map_err(|_| ValueError::new(original, "invalid week count"))?;

            return Ok(Duration {
                negative,
                weeks,
                ..Duration::ZERO
            });
        }

        let (date_part, time_part) = match rest.split_once('T') {
            Some((date, time)) => (date, Some(time)),
            None => (rest, None),
        };

        let days = take_component(date_part, 'D')?;

        let (hours, minutes, seconds) = match time_part {
            Some(time_part) => {
                let (rem, hours) = take_leading_component(time_part, 'H')?;
                let (rem, minutes) = take_leading_component(rem, 'M')?;
                let (rem, seconds) = take_leading_component(rem, 'S')?;
                if !rem.is_empty() {
                    return Err(ValueError::new(original, "trailing characters in duration"));
                }
                (hours, minutes, seconds)
            }
            None => (0, 0, 0),
        };

        if days == 0 && hours == 0 && minutes == 0 && seconds == 0 && date_part.is_empty() && time_part.is_none() {
            return Err(ValueError::new(original, "empty duration"));
        }

        Ok(Duration {
            negative,
            weeks: 0,
            days,
            hours,
            minutes,
            seconds,
        })
    }

    pub fn format(&self) -> String {
        if self.is_zero() {
            return String::from("P0D");
        }

        let mut output = String::new();
        if self.negative {
            output.push('-');
        }
        output.push('P');

        if self.weeks > 0 {
            output.push_str(&format!("{}W", self.weeks));
            return output;
        }

        if self.days > 0 {
            output.push_str(&format!("{}D", self.days));
        }

        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            output.push('T');
            if self.hours > 0 {
                output.push_str(&format!("{}H", self.hours));
            }
            if self.minutes > 0 {
                output.push_str(&format!("{}M", self.minutes));
            }
            if self.seconds > 0 {
                output.push_str(&format!("{}S", self.seconds));
            }
        }

        output
    }
}

fn take_component(part: &str, suffix: char) -> ValueResult<u64> {
    if part.is_empty() {
        return Ok(0);
    }

    let digits = part
        .strip_suffix(suffix)
        .ok_or_else(|| ValueError::new(part, format!("expected trailing {suffix}")))?;

    digits
        .parse::<u64>()
        .map_err(|_| ValueError::new(part, "invalid numeric component"))
}

/// Consumes an optional leading `<digits><suffix>` run, returning the
/// remainder and the parsed value (0 if the suffix isn't present at all,
/// since dur-time components are each individually optional).
fn take_leading_component(part: &str, suffix: char) -> ValueResult<(&str, u64)> {
    let Some(end) = part.find(suffix) else {
        return Ok((part, 0));
    };

    let digits = &part[..end];
    let value = digits
        .parse::<u64>()
        .map_err(|_| ValueError::new(part, "invalid numeric component"))?;

    Ok((&part[end + 1..], value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_is_p0d() {
        assert_eq!(Duration::ZERO.format(), "P0D");
    }

    #[test]
    fn round_trips_hours_and_minutes() {
        let duration = Duration::parse("PT1H30M").unwrap();
        assert_eq!(duration.format(), "PT1H30M");
        assert!(!duration.negative);
    }

    #[test]
    fn round_trips_days() {
        let duration = Duration::parse("P1D").unwrap();
        assert_eq!(duration.format(), "P1D");
        assert!(!duration.has_time_component());
    }

    #[test]
    fn negative_offsets_round_trip() {
        let duration = Duration::parse("-PT15M").unwrap();
        assert_eq!(duration.format(), "-PT15M");
        assert_eq!(duration.to_signed_seconds(), -900);
    }

    #[test]
    fn rejects_missing_p() {
        assert!(Duration::parse("T1H").is_err());
    }
}
