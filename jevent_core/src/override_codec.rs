//! OverrideCodec (spec.md §4.8): recurrence exceptions as JSON-patch
//! objects keyed by recurrence-id, plus the RDATE/EXDATE contributions
//! and the span computation `TzRegistry` needs for bounded VTIMEZONE
//! emission.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use jevent_ical::tree::{Component, Property};
use jevent_ical::values::date_time;
use jevent_ical::values::recur::Recur;

use crate::time::{LocalDateTime, TzBinding};

/// Escapes a JSON-pointer segment per RFC 6901 (spec.md §4.8).
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Deep, JSON-value-typed diff (spec.md §4.8's three-step algorithm):
/// equal values produce no entry; a non-object on either side emits one
/// `{current-path: new-value}` entry; otherwise recurse into every key of
/// the new object, with unknown/removed keys emitting a nullification
/// entry.
pub fn diff(old: &Value, new: &Value, path: &str, patch: &mut Map<String, Value>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, new_value) in new_map {
                let child_path = format!("{path}/{}", escape_pointer_segment(key));
                match old_map.get(key) {
                    Some(old_value) => diff(old_value, new_value, &child_path, patch),
                    None => {
                        patch.insert(child_path, new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    let child_path = format!("{path}/{}", escape_pointer_segment(key));
                    patch.insert(child_path, Value::Null);
                }
            }
        }
        _ => {
            patch.insert(path.to_string(), new.clone());
        }
    }
}

/// Diffs an exception event's decoded JSON against the master, producing
/// the JSON-pointer-keyed patch object stored as that recurrence-id's
/// override value.
pub fn diff_event(master: &Value, exception: &Value) -> Value {
    let mut patch = Map::new();
    diff(master, exception, "", &mut patch);
    Value::Object(patch)
}

/// Applies a JSON-pointer-keyed patch over `master`, reconstructing the
/// full exception event JSON (the reverse of `diff_event`, used when
/// re-encoding an override back into ICAL).
pub fn apply_patch(master: &Value, patch: &Value) -> Value {
    let mut result = master.clone();

    let Some(patch) = patch.as_object() else {
        return result;
    };

    for (pointer, value) in patch {
        apply_pointer(&mut result, pointer, value.clone());
    }

    result
}

fn apply_pointer(target: &mut Value, pointer: &str, value: Value) {
    if pointer.is_empty() {
        *target = value;
        return;
    }

    let segments: Vec<String> = pointer.trim_start_matches('/').split('/').map(unescape_pointer_segment).collect();

    let mut current = target;
    for (index, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just normalized to an object");

        if index == segments.len() - 1 {
            if value.is_null() {
                map.remove(segment);
            } else {
                map.insert(segment.clone(), value.clone());
            }
            return;
        }

        current = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Decodes `EXDATE` properties into override keys mapped to JSON null
/// (cancellations), formatted as local-date-times in the start timezone.
pub fn decode_exdates(component: &Component, start_binding: &TzBinding) -> Vec<String> {
    let mut keys = Vec::new();

    for property in component.properties_named("EXDATE") {
        for raw in property.value.split(',') {
            if let Some(key) = decode_date_or_date_time(raw, start_binding) {
                keys.push(key);
            }
        }
    }

    keys
}

/// Decodes `RDATE` properties into override additions: a bare occurrence
/// (empty-object patch, meaning "occurs identically to the master
/// pattern") or, when the RDATE period carries an explicit duration
/// different from the event's own, a patch overriding `duration`.
/// spec.md §9's open question: when a period specifies both an end and a
/// duration, the end-minus-start value is preferred.
pub fn decode_rdates(component: &Component, start_binding: &TzBinding, master_duration_seconds: Option<i64>) -> Vec<(String, Value)> {
    let mut entries = Vec::new();

    for property in component.properties_named("RDATE") {
        let is_period = property.param("VALUE") == Some("PERIOD");

        for raw in property.value.split(',') {
            if is_period {
                if let Some((key, duration_seconds)) = decode_period(raw, start_binding) {
                    let patch = match master_duration_seconds {
                        Some(master) if master == duration_seconds => Value::Object(Map::new()),
                        _ => {
                            let mut patch = Map::new();
                            patch.insert(
                                "duration".to_string(),
                                Value::String(jevent_ical::values::duration::Duration::from_signed_seconds(duration_seconds).format()),
                            );
                            Value::Object(patch)
                        }
                    };
                    entries.push((key, patch));
                }
            } else if let Some(key) = decode_date_or_date_time(raw, start_binding) {
                entries.push((key, Value::Object(Map::new())));
            }
        }
    }

    entries
}

fn decode_date_or_date_time(raw: &str, start_binding: &TzBinding) -> Option<String> {
    if raw.contains('T') {
        let (naive, is_utc) = date_time::parse_date_time(raw).ok()?;
        Some(local_key_from_naive(naive, is_utc, start_binding))
    } else {
        let date = date_time::parse_date(raw).ok()?;
        Some(LocalDateTime(date.and_hms_opt(0, 0, 0)?).format())
    }
}

/// `period = period-start "/" (period-end / dur-value)` (RFC 5545
/// §3.3.9). Returns the occurrence's local key plus its duration in
/// seconds, preferring end-minus-start when a period end is given
/// (spec.md §9's preserved preference) even though a duration is also
/// technically always derivable that way.
fn decode_period(raw: &str, start_binding: &TzBinding) -> Option<(String, i64)> {
    let (start_part, rest) = raw.split_once('/')?;
    let (start_naive, is_utc) = date_time::parse_date_time(start_part).ok()?;
    let key = local_key_from_naive(start_naive, is_utc, start_binding);

    let duration_seconds = if rest.starts_with('P') || rest.starts_with('-') || rest.starts_with('+') {
        jevent_ical::values::duration::Duration::parse(rest).ok()?.to_signed_seconds()
    } else {
        let (end_naive, _end_is_utc) = date_time::parse_date_time(rest).ok()?;
        (end_naive - start_naive).num_seconds()
    };

    Some((key, duration_seconds))
}

fn local_key_from_naive(naive: NaiveDateTime, is_utc: bool, start_binding: &TzBinding) -> String {
    if is_utc {
        let utc = crate::time::UtcDateTime(naive);
        match start_binding {
            TzBinding::Floating | TzBinding::Utc => LocalDateTime(utc.0).format(),
            TzBinding::Named(tz) => utc.to_local_in(tz).format(),
        }
    } else {
        LocalDateTime(naive).format()
    }
}

/// Encodes override cancellations (`null` values) as `EXDATE` properties
/// and bare additions (empty-object patches) as `RDATE` properties on the
/// master component. Non-empty patches are handled by the orchestrator,
/// which builds a full exception `VEVENT` instead.
pub fn encode_exdates_and_rdates(overrides: &Map<String, Value>, start_binding: &TzBinding) -> (Vec<Property>, Vec<Property>) {
    let mut exdates = Vec::new();
    let mut rdates = Vec::new();

    for (key, value) in overrides {
        let Ok(local) = LocalDateTime::parse(key) else { continue };

        match value {
            Value::Null => {
                exdates.push(encode_date_time_property("EXDATE", &local, start_binding));
            }
            Value::Object(patch) if patch.is_empty() => {
                rdates.push(encode_date_time_property("RDATE", &local, start_binding));
            }
            _ => {}
        }
    }

    (exdates, rdates)
}

fn encode_date_time_property(name: &str, local: &LocalDateTime, start_binding: &TzBinding) -> Property {
    match start_binding {
        TzBinding::Floating => Property::new(name, date_time::format_date_time(&local.0, false)),
        TzBinding::Utc => Property::new(name, date_time::format_date_time(&local.to_utc(start_binding).naive_utc(), true)),
        TzBinding::Named(tz) => {
            let mut property = Property::new(name, date_time::format_date_time(&local.0, false));
            property.set_param("TZID", tz.name());
            property
        }
    }
}

/// Span computation (spec.md §4.8): the earliest `DTSTART` and latest
/// `DTEND` across the master and every exception, expanding a bounded
/// recurrence via the `rrule` crate. An unbounded rule (no `COUNT`/
/// `UNTIL`) falls back to a sentinel "eternity" end a century out, rather
/// than iterating forever.
pub fn compute_span(
    recur: Option<&Recur>,
    master_start: NaiveDateTime,
    master_end: NaiveDateTime,
    exception_spans: &[(NaiveDateTime, NaiveDateTime)],
) -> (NaiveDateTime, NaiveDateTime) {
    const MAX_OCCURRENCES: usize = 4000;
    const ETERNITY_YEARS: i64 = 100;

    let mut earliest = master_start;
    let mut latest = master_end;

    for (start, end) in exception_spans {
        earliest = earliest.min(*start);
        latest = latest.max(*end);
    }

    let Some(recur) = recur else {
        return (earliest, latest);
    };

    if recur.count.is_none() && recur.until.is_none() {
        return (earliest, latest.max(master_start + chrono::Duration::days(365 * ETERNITY_YEARS)));
    }

    // `rrule` only needs wall-clock arithmetic to count occurrences here
    // (the span feeds a day-granularity VTIMEZONE scan, not a zoned
    // instant), so the DTSTART line carries no TZID either way.
    let ical_text = format!("DTSTART:{}\nRRULE:{}", date_time::format_date_time(&master_start, false), recur.format());

    match ical_text.parse::<rrule::RRuleSet>() {
        Ok(rrule_set) => {
            let mut count = 0usize;
            for occurrence in rrule_set.into_iter() {
                latest = latest.max(occurrence.naive_utc());
                count += 1;
                if count >= MAX_OCCURRENCES {
                    break;
                }
            }
        }
        Err(_) => {
            // Unparseable combination (unsupported RSCALE/SKIP, etc.):
            // fall back to the master/exception span alone rather than
            // failing the whole encode over a bounding-box estimate.
        }
    }

    (earliest, latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pointer_segments_are_escaped() {
        assert_eq!(escape_pointer_segment("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn diff_emits_nothing_for_equal_values() {
        let value = json!({"title": "x"});
        let patch = diff_event(&value, &value);
        assert_eq!(patch, json!({}));
    }

    #[test]
    fn diff_emits_addition_and_nullification() {
        let master = json!({"title": "x", "description": "d"});
        let exception = json!({"title": "y"});
        let patch = diff_event(&master, &exception);
        assert_eq!(patch["/title"], json!("y"));
        assert_eq!(patch["/description"], Value::Null);
    }

    #[test]
    fn diff_recurses_into_nested_objects() {
        let master = json!({"participants": {"a@x.com": {"roles": ["owner"]}}});
        let exception = json!({"participants": {"a@x.com": {"roles": ["owner", "chair"]}}});
        let patch = diff_event(&master, &exception);
        assert_eq!(patch["/participants/a@x.com/roles"], json!(["owner", "chair"]));
    }

    #[test]
    fn apply_patch_reverses_diff() {
        let master = json!({"title": "x", "description": "d"});
        let exception = json!({"title": "y"});
        let patch = diff_event(&master, &exception);
        let rebuilt = apply_patch(&master, &patch);
        assert_eq!(rebuilt, exception);
    }

    #[test]
    fn apply_patch_handles_escaped_slash_in_key() {
        let master = json!({});
        let mut patch = Map::new();
        patch.insert("/participants/a~1b@x.com/roles".to_string(), json!(["owner"]));
        let rebuilt = apply_patch(&master, &Value::Object(patch));
        assert_eq!(rebuilt["participants"]["a/b@x.com"]["roles"], json!(["owner"]));
    }
}
