//! RecurrenceCodec (spec.md §4.3): translates a recurrence rule in both
//! directions, normalizing by-X arrays to ascending order on encode and
//! validating their ranges on decode.

use serde::{Deserialize, Serialize};

use jevent_ical::values::recur::{Frequency as IcalFrequency, Recur, Until, WeekDay, WeekDayNum};

use crate::error::{Error, PathStack};
use crate::time::{LocalDateTime, TzBinding, UtcDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurFrequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl From<RecurFrequency> for IcalFrequency {
    fn from(value: RecurFrequency) -> Self {
        match value {
            RecurFrequency::Secondly => IcalFrequency::Secondly,
            RecurFrequency::Minutely => IcalFrequency::Minutely,
            RecurFrequency::Hourly => IcalFrequency::Hourly,
            RecurFrequency::Daily => IcalFrequency::Daily,
            RecurFrequency::Weekly => IcalFrequency::Weekly,
            RecurFrequency::Monthly => IcalFrequency::Monthly,
            RecurFrequency::Yearly => IcalFrequency::Yearly,
        }
    }
}

impl From<IcalFrequency> for RecurFrequency {
    fn from(value: IcalFrequency) -> Self {
        match value {
            IcalFrequency::Secondly => RecurFrequency::Secondly,
            IcalFrequency::Minutely => RecurFrequency::Minutely,
            IcalFrequency::Hourly => RecurFrequency::Hourly,
            IcalFrequency::Daily => RecurFrequency::Daily,
            IcalFrequency::Weekly => RecurFrequency::Weekly,
            IcalFrequency::Monthly => RecurFrequency::Monthly,
            IcalFrequency::Yearly => RecurFrequency::Yearly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skip {
    Omit,
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByDayEntry {
    pub weekday: String,
    #[serde(rename = "nthOfPeriod", skip_serializing_if = "Option::is_none")]
    pub nth_of_period: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecurrenceRule {
    pub frequency: Option<RecurFrequency>,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rscale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<Skip>,
    #[serde(rename = "firstDayOfWeek", skip_serializing_if = "Option::is_none")]
    pub first_day_of_week: Option<String>,
    #[serde(rename = "byDay", default, skip_serializing_if = "Vec::is_empty")]
    pub by_day: Vec<ByDayEntry>,
    #[serde(rename = "byMonth", default, skip_serializing_if = "Vec::is_empty")]
    pub by_month: Vec<i64>,
    #[serde(rename = "byDate", default, skip_serializing_if = "Vec::is_empty")]
    pub by_date: Vec<i64>,
    #[serde(rename = "byYearDay", default, skip_serializing_if = "Vec::is_empty")]
    pub by_year_day: Vec<i64>,
    #[serde(rename = "byWeekNo", default, skip_serializing_if = "Vec::is_empty")]
    pub by_week_no: Vec<i64>,
    #[serde(rename = "byHour", default, skip_serializing_if = "Vec::is_empty")]
    pub by_hour: Vec<i64>,
    #[serde(rename = "byMinute", default, skip_serializing_if = "Vec::is_empty")]
    pub by_minute: Vec<i64>,
    #[serde(rename = "bySecond", default, skip_serializing_if = "Vec::is_empty")]
    pub by_second: Vec<i64>,
    #[serde(rename = "bySetPosition", default, skip_serializing_if = "Vec::is_empty")]
    pub by_set_position: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Local-date-time in the event's start timezone (spec.md §4.3: stored
    /// in JSON local, UTC on the wire).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

fn one() -> u64 {
    1
}

fn is_one(value: &u64) -> bool {
    *value == 1
}

struct Range {
    min: i64,
    max: i64,
    zero_allowed: bool,
}

const BY_DATE_RANGE: Range = Range { min: -31, max: 31, zero_allowed: false };
const BY_MONTH_RANGE: Range = Range { min: 1, max: 12, zero_allowed: false };
const BY_YEAR_DAY_RANGE: Range = Range { min: -366, max: 366, zero_allowed: false };
const BY_WEEK_NO_RANGE: Range = Range { min: -53, max: 53, zero_allowed: false };
const BY_HOUR_RANGE: Range = Range { min: 0, max: 23, zero_allowed: true };
const BY_MINUTE_RANGE: Range = Range { min: 0, max: 59, zero_allowed: true };
const BY_SECOND_RANGE: Range = Range { min: 0, max: 59, zero_allowed: true };
const BY_SET_POSITION_RANGE: Range = Range { min: -366, max: 366, zero_allowed: true };

fn validate_range(path_stack: &mut PathStack, field: &str, values: &[i64], range: Range) {
    for (index, value) in values.iter().enumerate() {
        if *value == 0 && !range.zero_allowed {
            path_stack.scoped(format!("{field}[{index}]"), |stack| {
                stack.record(format!("{field} entries must not be zero"));
            });
            continue;
        }
        if *value < range.min || *value > range.max {
            path_stack.scoped(format!("{field}[{index}]"), |stack| {
                stack.record(format!("{field} entry {value} outside [{}, {}]", range.min, range.max));
            });
        }
    }
}

fn sorted(mut values: Vec<i64>) -> Vec<i64> {
    values.sort_unstable();
    values
}

impl RecurrenceRule {
    /// Decodes an ICAL `RRULE`/`EXRULE` value into the JSON model, binding
    /// `until` to the event's start timezone and validating every by-X
    /// range. Returns accumulated field errors rather than aborting so
    /// the caller can report every offending entry at once.
    pub fn from_ical(recur: &Recur, start_binding: &TzBinding, path_stack: &mut PathStack) -> Result<Self, Error> {
        if recur.count.is_some() && recur.until.is_some() {
            path_stack.record("count and until are mutually exclusive");
        }

        validate_range(path_stack, "byDate", &recur.by_month_day, BY_DATE_RANGE);
        validate_range(path_stack, "byMonth", &recur.by_month, BY_MONTH_RANGE);
        validate_range(path_stack, "byYearDay", &recur.by_year_day, BY_YEAR_DAY_RANGE);
        validate_range(path_stack, "byWeekNo", &recur.by_week_no, BY_WEEK_NO_RANGE);
        validate_range(path_stack, "byHour", &recur.by_hour, BY_HOUR_RANGE);
        validate_range(path_stack, "byMinute", &recur.by_minute, BY_MINUTE_RANGE);
        validate_range(path_stack, "bySecond", &recur.by_second, BY_SECOND_RANGE);
        validate_range(path_stack, "bySetPosition", &recur.by_set_position, BY_SET_POSITION_RANGE);

        let until = match &recur.until {
            Some(Until::DateTime(naive, _is_utc)) => {
                Some(local_until_from_utc(UtcDateTime(*naive), start_binding).format())
            }
            Some(Until::Date(date)) => Some(
                LocalDateTime(date.and_hms_opt(0, 0, 0).expect("midnight is always valid")).format(),
            ),
            None => None,
        };

        let skip = match recur.skip.as_deref() {
            Some("OMIT") => Some(Skip::Omit),
            Some("BACKWARD") => Some(Skip::Backward),
            Some("FORWARD") => Some(Skip::Forward),
            Some(other) => {
                path_stack.scoped("skip", |stack| stack.record(format!("unrecognized SKIP value {other:?}")));
                None
            }
            None => None,
        };

        Ok(RecurrenceRule {
            frequency: recur.freq.map(RecurFrequency::from),
            interval: recur.interval.unwrap_or(1),
            rscale: recur.rscale.clone(),
            skip,
            first_day_of_week: recur.week_start.map(|weekday| weekday.to_lowercase_name().to_string()),
            by_day: recur
                .by_day
                .iter()
                .map(|entry| ByDayEntry {
                    weekday: entry.weekday.to_lowercase_name().to_string(),
                    nth_of_period: entry.ordinal,
                })
                .collect(),
            by_month: recur.by_month.clone(),
            by_date: recur.by_month_day.clone(),
            by_year_day: recur.by_year_day.clone(),
            by_week_no: recur.by_week_no.clone(),
            by_hour: recur.by_hour.clone(),
            by_minute: recur.by_minute.clone(),
            by_second: recur.by_second.clone(),
            by_set_position: recur.by_set_position.clone(),
            count: recur.count,
            until,
        })
    }

    /// Encodes the JSON model to an ICAL `Recur` value, normalizing every
    /// by-X array to ascending order (spec.md §4.3/§5).
    pub fn to_ical(&self, start_binding: &TzBinding, path_stack: &mut PathStack) -> Result<Recur, Error> {
        if self.count.is_some() && self.until.is_some() {
            path_stack.record("count and until are mutually exclusive");
        }

        let by_day = self
            .by_day
            .iter()
            .map(|entry| {
                WeekDay::from_lowercase_name(&entry.weekday)
                    .map(|weekday| WeekDayNum { ordinal: entry.nth_of_period, weekday })
                    .map_err(|err| err.message)
            })
            .collect::<Result<Vec<_>, String>>()
            .map_err(|message| {
                path_stack.scoped("byDay", |stack| stack.record(message.clone()));
                Error::invalid_ical(message)
            })?;

        let until = match &self.until {
            Some(raw) => {
                let local = LocalDateTime::parse(raw)?;
                let utc = local.to_utc(start_binding);
                Some(Until::DateTime(utc.naive_utc(), true))
            }
            None => None,
        };

        let week_start = match &self.first_day_of_week {
            Some(name) => Some(
                WeekDay::from_lowercase_name(name).map_err(|err| {
                    path_stack.scoped("firstDayOfWeek", |stack| stack.record(err.message.clone()));
                    Error::invalid_ical(err.message)
                })?,
            ),
            None => None,
        };

        Ok(Recur {
            freq: self.frequency.map(IcalFrequency::from),
            rscale: self.rscale.clone(),
            skip: self.skip.map(|skip| match skip {
                Skip::Omit => "OMIT".to_string(),
                Skip::Backward => "BACKWARD".to_string(),
                Skip::Forward => "FORWARD".to_string(),
            }),
            until,
            count: self.count,
            interval: Some(self.interval.max(1)),
            by_second: sorted(self.by_second.clone()),
            by_minute: sorted(self.by_minute.clone()),
            by_hour: sorted(self.by_hour.clone()),
            by_day,
            by_month_day: sorted(self.by_date.clone()),
            by_year_day: sorted(self.by_year_day.clone()),
            by_week_no: sorted(self.by_week_no.clone()),
            by_month: sorted(self.by_month.clone()),
            by_set_pos: sorted(self.by_set_position.clone()),
            week_start,
        })
    }
}

fn local_until_from_utc(utc: UtcDateTime, binding: &TzBinding) -> LocalDateTime {
    match binding {
        TzBinding::Floating | TzBinding::Utc => LocalDateTime(utc.0),
        TzBinding::Named(tz) => utc.to_local_in(tz),
    }
}

/// Re-anchors a stored UTC `until` instant when the event's start
/// timezone changes on update (spec.md §4.3): read as the old zone's
/// local value, rebind to the new zone, reconvert to UTC.
pub fn reanchor_until(until_utc: UtcDateTime, old_binding: &TzBinding, new_binding: &TzBinding) -> UtcDateTime {
    let local = local_until_from_utc(until_utc, old_binding);
    UtcDateTime(local.to_utc(new_binding).naive_utc())
}

/// `reanchor_until`, formatted as the local date-time text JSON carries
/// `until` as under `new_binding`. What `codec::encode` calls when an
/// update changes `timeZone` on an event that already has a recurrence
/// `until`.
pub fn reanchor_until_as_local_text(until_utc: UtcDateTime, old_binding: &TzBinding, new_binding: &TzBinding) -> String {
    local_until_from_utc(reanchor_until(until_utc, old_binding, new_binding), new_binding).format()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_by_x_arrays_to_ascending_order() {
        let rule = RecurrenceRule {
            frequency: Some(RecurFrequency::Monthly),
            interval: 1,
            by_date: vec![10, 7, -1],
            ..Default::default()
        };
        let mut path_stack = PathStack::new();
        let recur = rule.to_ical(&TzBinding::Floating, &mut path_stack).unwrap();
        assert_eq!(recur.by_month_day, vec![-1, 7, 10]);
    }

    #[test]
    fn count_and_until_together_is_rejected() {
        let rule = RecurrenceRule {
            frequency: Some(RecurFrequency::Daily),
            count: Some(5),
            until: Some("2024-01-01T00:00:00".to_string()),
            ..Default::default()
        };
        let mut path_stack = PathStack::new();
        let _ = rule.to_ical(&TzBinding::Floating, &mut path_stack);
        assert!(!path_stack.is_empty());
    }

    #[test]
    fn skip_round_trips_through_ical_in_both_directions() {
        let rule = RecurrenceRule {
            frequency: Some(RecurFrequency::Yearly),
            rscale: Some("CHINESE".to_string()),
            skip: Some(Skip::Backward),
            ..Default::default()
        };
        let mut path_stack = PathStack::new();
        let recur = rule.to_ical(&TzBinding::Floating, &mut path_stack).unwrap();
        assert_eq!(recur.skip.as_deref(), Some("BACKWARD"));

        let mut path_stack = PathStack::new();
        let decoded = RecurrenceRule::from_ical(&recur, &TzBinding::Floating, &mut path_stack).unwrap();
        assert_eq!(decoded.skip, Some(Skip::Backward));
    }

    #[test]
    fn rejects_out_of_range_by_hour() {
        let mut path_stack = PathStack::new();
        validate_range(&mut path_stack, "byHour", &[24], BY_HOUR_RANGE);
        assert!(!path_stack.is_empty());
    }

    #[test]
    fn rejects_zero_by_month() {
        let mut path_stack = PathStack::new();
        validate_range(&mut path_stack, "byMonth", &[0], BY_MONTH_RANGE);
        assert!(!path_stack.is_empty());
    }
}
