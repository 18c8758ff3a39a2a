//! RECUR value data type (RFC 5545 §3.3.10), the `RRULE`/`EXRULE` value
//! grammar, extended with the `RSCALE`/`SKIP` parts RFC 7529 adds for
//! non-Gregorian calendars (spec.md §3's `rscale`/`skip` fields).
//!
//! ```text
//! recur           = recur-rule-part *( ";" recur-rule-part )
//! recur-rule-part = ( "FREQ" "=" freq ) / ( "UNTIL" "=" enddate )
//!                 / ( "COUNT" "=" 1*DIGIT ) / ( "INTERVAL" "=" 1*DIGIT )
//!                 / ( "BYSECOND" "=" byseclist ) / ( "BYMINUTE" "=" byminlist )
//!                 / ( "BYHOUR" "=" byhrlist ) / ( "BYDAY" "=" bywdaylist )
//!                 / ( "BYMONTHDAY" "=" bymodaylist ) / ( "BYYEARDAY" "=" byyrdaylist )
//!                 / ( "BYWEEKNO" "=" bywknolist ) / ( "BYMONTH" "=" bymolist )
//!                 / ( "BYSETPOS" "=" bysplist ) / ( "WKST" "=" weekday )
//! ```
//!
//! `count` and `until` are mutually exclusive (spec.md §3's invariant);
//! this module only parses/formats the value text, validation of ranges
//! and the count/until exclusivity lives in `jevent_core::recurrence`.

use crate::error::{ValueError, ValueResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn parse(value: &str) -> ValueResult<Self> {
        match value {
            "SECONDLY" => Ok(Self::Secondly),
            "MINUTELY" => Ok(Self::Minutely),
            "HOURLY" => Ok(Self::Hourly),
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(ValueError::new(other, "unrecognized FREQ value")),
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Self::Secondly => "SECONDLY",
            Self::Minutely => "MINUTELY",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WeekDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl WeekDay {
    pub fn parse(value: &str) -> ValueResult<Self> {
        match value {
            "SU" => Ok(Self::Sunday),
            "MO" => Ok(Self::Monday),
            "TU" => Ok(Self::Tuesday),
            "WE" => Ok(Self::Wednesday),
            "TH" => Ok(Self::Thursday),
            "FR" => Ok(Self::Friday),
            "SA" => Ok(Self::Saturday),
            other => Err(ValueError::new(other, "unrecognized weekday")),
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Self::Sunday => "SU",
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
        }
    }

    /// Lowercase name, the form spec.md §3's `byDay[*].weekday` uses.
    pub fn to_lowercase_name(&self) -> &'static str {
        match self {
            Self::Sunday => "sunday",
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
        }
    }

    pub fn from_lowercase_name(value: &str) -> ValueResult<Self> {
        match value {
            "sunday" => Ok(Self::Sunday),
            "monday" => Ok(Self::Monday),
            "tuesday" => Ok(Self::Tuesday),
            "wednesday" => Ok(Self::Wednesday),
            "thursday" => Ok(Self::Thursday),
            "friday" => Ok(Self::Friday),
            "saturday" => Ok(Self::Saturday),
            other => Err(ValueError::new(other, "unrecognized weekday name")),
        }
    }

    pub fn to_chrono(&self) -> chrono::Weekday {
        match self {
            Self::Sunday => chrono::Weekday::Sun,
            Self::Monday => chrono::Weekday::Mon,
            Self::Tuesday => chrono::Weekday::Tue,
            Self::Wednesday => chrono::Weekday::Wed,
            Self::Thursday => chrono::Weekday::Thu,
            Self::Friday => chrono::Weekday::Fri,
            Self::Saturday => chrono::Weekday::Sat,
        }
    }
}

/// `weekdaynum = [[plus / minus] ordwk] weekday` - a BYDAY entry, e.g.
/// `-1SU` (last Sunday) or `2WE` (second Wednesday). `ordinal` is `None`
/// for a plain weekday with no "nth of period" qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekDayNum {
    pub ordinal: Option<i32>,
    pub weekday: WeekDay,
}

impl WeekDayNum {
    pub fn parse(value: &str) -> ValueResult<Self> {
        let (ordinal_part, weekday_part) = value.split_at(value.len().saturating_sub(2));

        let weekday = WeekDay::parse(weekday_part)?;

        let ordinal = if ordinal_part.is_empty() {
            None
        } else {
            Some(
                ordinal_part
                    .parse::<i32>()
                    .map_err(|_| ValueError::new(value, "invalid BYDAY ordinal"))?,
            )
        };

        Ok(WeekDayNum { ordinal, weekday })
    }

    pub fn format(&self) -> String {
        match self.ordinal {
            Some(ordinal) => format!("{ordinal}{}", self.weekday.format()),
            None => self.weekday.format().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Until {
    Date(chrono::NaiveDate),
    DateTime(chrono::NaiveDateTime, bool),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recur {
    pub freq: Option<Frequency>,
    pub rscale: Option<String>,
    pub skip: Option<String>,
    pub until: Option<Until>,
    pub count: Option<u64>,
    pub interval: Option<u64>,
    pub by_second: Vec<i64>,
    pub by_minute: Vec<i64>,
    pub by_hour: Vec<i64>,
    pub by_day: Vec<WeekDayNum>,
    pub by_month_day: Vec<i64>,
    pub by_year_day: Vec<i64>,
    pub by_week_no: Vec<i64>,
    pub by_month: Vec<i64>,
    pub by_set_pos: Vec<i64>,
    pub week_start: Option<WeekDay>,
}

fn parse_int_list(value: &str) -> ValueResult<Vec<i64>> {
    value
        .split(',')
        .map(|entry| {
            entry
                .parse::<i64>()
                .map_err(|_| ValueError::new(entry, "expected an integer"))
        })
        .collect()
}

fn format_int_list(values: &[i64]) -> String {
    values.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

impl Recur {
    pub fn parse(value: &str) -> ValueResult<Self> {
        let mut recur = Recur::default();

        for part in value.split(';') {
            if part.is_empty() {
                continue;
            }

            let (key, part_value) = part
                .split_once('=')
                .ok_or_else(|| ValueError::new(part, "expected KEY=VALUE recur-rule-part"))?;

            match key {
                "FREQ" => recur.freq = Some(Frequency::parse(part_value)?),
                "RSCALE" => recur.rscale = Some(part_value.to_string()),
                "SKIP" => recur.skip = Some(part_value.to_string()),
                "UNTIL" => {
                    recur.until = Some(if part_value.contains('T') {
                        let (dt, is_utc) = crate::values::date_time::parse_date_time(part_value)?;
                        Until::DateTime(dt, is_utc)
                    } else {
                        Until::Date(crate::values::date_time::parse_date(part_value)?)
                    });
                }
                "COUNT" => {
                    recur.count = Some(
                        part_value
                            .parse::<u64>()
                            .map_err(|_| ValueError::new(part_value, "invalid COUNT"))?,
                    )
                }
                "INTERVAL" => {
                    recur.interval = Some(
                        part_value
                            .parse::<u64>()
                            .map_err(|_| ValueError::new(part_value, "invalid INTERVAL"))?,
                    )
                }
                "BYSECOND" => recur.by_second = parse_int_list(part_value)?,
                "BYMINUTE" => recur.by_minute = parse_int_list(part_value)?,
                "BYHOUR" => recur.by_hour = parse_int_list(part_value)?,
                "BYDAY" => {
                    recur.by_day = part_value
                        .split(',')
                        .map(WeekDayNum::parse)
                        .collect::<ValueResult<Vec<_>>>()?
                }
                "BYMONTHDAY" => recur.by_month_day = parse_int_list(part_value)?,
                "BYYEARDAY" => recur.by_year_day = parse_int_list(part_value)?,
                "BYWEEKNO" => recur.by_week_no = parse_int_list(part_value)?,
                "BYMONTH" => recur.by_month = parse_int_list(part_value)?,
                "BYSETPOS" => recur.by_set_pos = parse_int_list(part_value)?,
                "WKST" => recur.week_start = Some(WeekDay::parse(part_value)?),
                _ => {
                    // Unknown recur-rule-part: preserved nowhere, dropped
                    // silently, same as an unrecognized X- extension.
                }
            }
        }

        Ok(recur)
    }

    pub fn format(&self) -> String {
        let mut parts = Vec::new();

        if let Some(freq) = self.freq {
            parts.push(format!("FREQ={}", freq.format()));
        }
        if let Some(rscale) = &self.rscale {
            parts.push(format!("RSCALE={rscale}"));
        }
        if let Some(interval) = self.interval {
            parts.push(format!("INTERVAL={interval}"));
        }
        if !self.by_second.is_empty() {
            parts.push(format!("BYSECOND={}", format_int_list(&self.by_second)));
        }
        if !self.by_minute.is_empty() {
            parts.push(format!("BYMINUTE={}", format_int_list(&self.by_minute)));
        }
        if !self.by_hour.is_empty() {
            parts.push(format!("BYHOUR={}", format_int_list(&self.by_hour)));
        }
        if !self.by_day.is_empty() {
            let days = self.by_day.iter().map(WeekDayNum::format).collect::<Vec<_>>().join(",");
            parts.push(format!("BYDAY={days}"));
        }
        if !self.by_month_day.is_empty() {
            parts.push(format!("BYMONTHDAY={}", format_int_list(&self.by_month_day)));
        }
        if !self.by_year_day.is_empty() {
            parts.push(format!("BYYEARDAY={}", format_int_list(&self.by_year_day)));
        }
        if !self.by_week_no.is_empty() {
            parts.push(format!("BYWEEKNO={}", format_int_list(&self.by_week_no)));
        }
        if !self.by_month.is_empty() {
            parts.push(format!("BYMONTH={}", format_int_list(&self.by_month)));
        }
        if let Some(skip) = &self.skip {
            parts.push(format!("SKIP={skip}"));
        }
        if let Some(week_start) = self.week_start {
            parts.push(format!("WKST={}", week_start.format()));
        }
        if !self.by_set_pos.is_empty() {
            parts.push(format!("BYSETPOS={}", format_int_list(&self.by_set_pos)));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={count}"));
        }
        if let Some(until) = &self.until {
            let rendered = match until {
                Until::Date(date) => crate::values::date_time::format_date(date),
                Until::DateTime(dt, is_utc) => crate::values::date_time::format_date_time(dt, *is_utc),
            };
            parts.push(format!("UNTIL={rendered}"));
        }

        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_weekly_byday() {
        let recur = Recur::parse("FREQ=WEEKLY;BYDAY=MO").unwrap();
        assert_eq!(recur.freq, Some(Frequency::Weekly));
        assert_eq!(recur.by_day, vec![WeekDayNum { ordinal: None, weekday: WeekDay::Monday }]);
    }

    #[test]
    fn parses_ordinal_byday() {
        let parsed = WeekDayNum::parse("-1SU").unwrap();
        assert_eq!(parsed.ordinal, Some(-1));
        assert_eq!(parsed.weekday, WeekDay::Sunday);
        assert_eq!(parsed.format(), "-1SU");
    }

    #[test]
    fn round_trips_full_rule() {
        let source = "FREQ=MONTHLY;INTERVAL=2;BYMONTHDAY=7,10;COUNT=10";
        let recur = Recur::parse(source).unwrap();
        assert_eq!(recur.format(), source);
    }

    #[test]
    fn until_is_mutually_exclusive_with_count_at_the_model_layer() {
        let recur = Recur::parse("FREQ=DAILY;UNTIL=19971007T000000Z").unwrap();
        assert!(recur.count.is_none());
        assert!(recur.until.is_some());
    }
}
