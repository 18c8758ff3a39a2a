//! End-to-end scenarios (`spec.md` §8), exercised against the public
//! `encode`/`decode` surface rather than any single codec in isolation.

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use jevent_core::{decode, encode, Options};
use jevent_ical::EventTree;
use pretty_assertions_sorted::assert_eq;
use serde_json::json;

#[test]
fn minimal_event_produces_the_expected_ical_shape() {
    let event = json!({
        "uid": "A",
        "start": "2024-03-10T09:00:00",
        "timeZone": "Europe/Berlin",
        "duration": "PT1H",
        "title": "x",
    });

    let options = Options::new();
    let ical = encode(&event, None, None, &options).unwrap();
    let tree = EventTree::split(&ical).unwrap();

    let dtstart = tree.master.property("DTSTART").unwrap();
    assert_eq!(dtstart.value, "20240310T090000");
    assert_eq!(dtstart.param("TZID"), Some("Europe/Berlin"));
    assert_eq!(tree.master.property("DURATION").unwrap().value, "PT1H");
    assert_eq!(tree.master.property("SUMMARY").unwrap().value, "x");

    let berlin_vtimezones: Vec<_> = ical
        .components_named("VTIMEZONE")
        .filter(|vtimezone| vtimezone.property("TZID").map(|p| p.value.as_str()) == Some("Europe/Berlin"))
        .collect();
    assert_eq!(berlin_vtimezones.len(), 1);
}

#[test]
fn all_day_event_encodes_a_date_only_dtstart_with_no_tzid() {
    let event = json!({
        "uid": "B",
        "isAllDay": true,
        "start": "2024-01-01T00:00:00",
        "duration": "P1D",
    });

    let options = Options::new();
    let ical = encode(&event, None, None, &options).unwrap();
    let tree = EventTree::split(&ical).unwrap();

    let dtstart = tree.master.property("DTSTART").unwrap();
    assert_eq!(dtstart.value, "20240101");
    assert_eq!(dtstart.param("VALUE"), Some("DATE"));
    assert!(dtstart.param("TZID").is_none());

    let decoded = decode(&ical, None, &options).unwrap();
    assert_eq!(decoded["isAllDay"], json!(true));
}

#[test]
fn weekly_recurrence_with_a_cancelled_occurrence_emits_exdate_with_no_second_vevent() {
    let event = json!({
        "uid": "C",
        "start": "2024-03-11T09:00:00",
        "timeZone": "Europe/Berlin",
        "duration": "PT1H",
        "recurrenceRule": {"frequency": "weekly", "byDay": [{"weekday": "monday"}]},
        "recurrenceOverrides": {"2024-03-18T09:00:00": null},
    });

    let options = Options::new();
    let ical = encode(&event, None, None, &options).unwrap();
    let tree = EventTree::split(&ical).unwrap();

    assert_eq!(tree.master.property("EXDATE").unwrap().value, "20240318T090000");
    assert!(tree.exceptions.is_empty());

    let decoded = decode(&ical, None, &options).unwrap();
    assert_eq!(decoded["recurrenceOverrides"]["2024-03-18T09:00:00"], json!(null));
}

#[test]
fn a_retitled_occurrence_produces_a_sparse_override_patch() {
    let event = json!({
        "uid": "C2",
        "start": "2024-03-11T09:00:00",
        "timeZone": "Europe/Berlin",
        "duration": "PT1H",
        "title": "Standup",
        "recurrenceRule": {"frequency": "weekly", "byDay": [{"weekday": "monday"}]},
        "recurrenceOverrides": {
            "2024-03-18T09:00:00": {"title": "Standup (moved)"},
        },
    });

    let options = Options::new();
    let ical = encode(&event, None, None, &options).unwrap();
    let tree = EventTree::split(&ical).unwrap();
    assert_eq!(tree.exceptions.len(), 1);

    let decoded = decode(&ical, None, &options).unwrap();
    let patch = &decoded["recurrenceOverrides"]["2024-03-18T09:00:00"];
    assert_eq!(patch["/title"], json!("Standup (moved)"));
    assert!(patch.get("/uid").is_none(), "patch should not nullify uid: {patch:?}");
    assert!(patch.get("/recurrenceRule").is_none(), "patch should not nullify recurrenceRule: {patch:?}");
    assert!(patch.get("/sequence").is_none(), "patch should not nullify sequence: {patch:?}");
}

#[test]
fn delegation_chain_resolves_through_an_intermediate_delegate() {
    use jevent_ical::tree::{Component, Property};

    let mut calendar = Component::new("VCALENDAR");
    let mut vevent = Component::new("VEVENT");
    vevent.push_property(Property::new("UID", "D"));
    vevent.push_property(Property::new("DTSTART", "20240310T090000Z"));

    let mut organizer = Property::new("ORGANIZER", "mailto:boss@example.com");
    organizer.set_param("CN", "Boss");
    vevent.push_property(organizer);

    let mut delegator = Property::new("ATTENDEE", "mailto:a@example.com");
    delegator.set_param("PARTSTAT", "DELEGATED");
    delegator.set_param("DELEGATED-TO", "mailto:b@example.com");
    vevent.push_property(delegator);

    let mut delegate = Property::new("ATTENDEE", "mailto:b@example.com");
    delegate.set_param("PARTSTAT", "ACCEPTED");
    vevent.push_property(delegate);

    calendar.push_component(vevent);

    let options = Options::new();
    let decoded = decode(&calendar, None, &options).unwrap();

    assert_eq!(decoded["participants"]["a@example.com"]["scheduleStatus"], json!("accepted"));
}

#[test]
fn location_round_trips_with_coordinates_and_address() {
    let event = json!({
        "uid": "E",
        "start": "2024-03-10T09:00:00",
        "timeZone": "Europe/Berlin",
        "duration": "PT1H",
        "locations": {
            "loc1": {
                "name": "HQ",
                "coordinates": "geo:37.386013,-122.082932",
                "address": {"locality": "Mountain View"},
            },
        },
    });

    let options = Options::new();
    let ical = encode(&event, None, None, &options).unwrap();
    let tree = EventTree::split(&ical).unwrap();

    assert!(tree.master.property("GEO").is_some());
    let location_property = tree.master.property("X-LOCATION").unwrap();
    assert!(location_property.param("ALTREP").is_some());

    let decoded = decode(&ical, None, &options).unwrap();
    assert_eq!(decoded["locations"]["loc1"]["name"], json!("HQ"));
    assert_eq!(decoded["locations"]["loc1"]["coordinates"], json!("geo:37.386013,-122.082932"));
    assert_eq!(decoded["locations"]["loc1"]["address"]["locality"], json!("Mountain View"));
}

#[test]
fn german_title_translation_decodes_into_a_nested_translations_object() {
    use jevent_ical::tree::{Component, Property};

    let mut calendar = Component::new("VCALENDAR");
    let mut vevent = Component::new("VEVENT");
    vevent.push_property(Property::new("UID", "F"));
    vevent.push_property(Property::new("DTSTART", "20240310T090000Z"));
    vevent.push_property(Property::new("SUMMARY", "Test"));

    let mut translation = Property::new("X-JMAP-TRANSLATION", "Test");
    translation.set_param("LANGUAGE", "de");
    translation.set_param("X-JMAP-PROP", "title");
    vevent.push_property(translation);

    calendar.push_component(vevent);

    let options = Options::new();
    let decoded = decode(&calendar, None, &options).unwrap();

    assert_eq!(decoded["translations"]["de"]["title"], json!("Test"));
}

#[test]
fn recurrence_rule_with_both_count_and_until_is_rejected() {
    let event = json!({
        "uid": "G",
        "start": "2024-03-10T09:00:00",
        "duration": "PT1H",
        "recurrenceRule": {
            "frequency": "daily",
            "count": 5,
            "until": "2024-04-01T00:00:00",
        },
    });

    let options = Options::new();
    let result = encode(&event, None, None, &options);
    assert!(matches!(result, Err(jevent_core::Error::PropertyErrors(_))));
}

#[test]
fn updating_a_prior_event_bumps_sequence_and_keeps_the_uid() {
    let event = json!({
        "uid": "H",
        "start": "2024-03-10T09:00:00",
        "duration": "PT1H",
        "title": "first",
    });

    let options = Options::new();
    let first = encode(&event, None, None, &options).unwrap();

    let update = json!({
        "start": "2024-03-10T09:00:00",
        "duration": "PT1H",
        "title": "second",
    });
    let second = encode(&update, Some(&first), None, &options).unwrap();

    let tree = EventTree::split(&second).unwrap();
    assert_eq!(tree.master.property("UID").unwrap().value, "H");
    assert_eq!(tree.master.property("SEQUENCE").unwrap().value, "1");
    assert_eq!(tree.master.property("SUMMARY").unwrap().value, "second");
}

#[test]
fn changing_the_start_time_zone_on_update_reanchors_an_existing_until() {
    let original = json!({
        "uid": "I",
        "start": "2024-03-10T09:00:00",
        "timeZone": "Europe/Berlin",
        "duration": "PT1H",
        "recurrenceRule": {
            "frequency": "daily",
            "until": "2024-04-01T09:00:00",
        },
    });

    let options = Options::new();
    let prior = encode(&original, None, None, &options).unwrap();

    // The update flips `timeZone` and supplies a deliberately stale
    // `until` placeholder - re-anchoring must derive the real value from
    // the prior ICAL's stored UTC instant rather than trust this text.
    let updated = json!({
        "start": "2024-03-10T09:00:00",
        "timeZone": "America/New_York",
        "duration": "PT1H",
        "recurrenceRule": {
            "frequency": "daily",
            "until": "2099-01-01T00:00:00",
        },
    });
    let reanchored = encode(&updated, Some(&prior), None, &options).unwrap();
    let reanchored_tree = EventTree::split(&reanchored).unwrap();
    let rrule = &reanchored_tree.master.property("RRULE").unwrap().value;

    // Expected: Berlin's 2024-04-01T09:00:00 read back as Berlin local,
    // rebound to the same digits in New York, converted to UTC - not the
    // placeholder's 2099 value.
    let new_york: Tz = "America/New_York".parse().unwrap();
    let carried_local = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
    let expected_utc = new_york.from_local_datetime(&carried_local).single().unwrap().naive_utc();
    let expected_until = format!("UNTIL={}", expected_utc.format("%Y%m%dT%H%M%SZ"));

    assert!(rrule.contains(&expected_until), "expected {rrule:?} to contain {expected_until:?}");
    assert!(!rrule.contains("2099"), "placeholder until leaked through unreanchored: {rrule:?}");

    // An encode from scratch handed the already-reanchored local text
    // directly produces byte-identical output.
    let from_scratch = json!({
        "uid": "I",
        "start": "2024-03-10T09:00:00",
        "timeZone": "America/New_York",
        "duration": "PT1H",
        "recurrenceRule": {
            "frequency": "daily",
            "until": carried_local.format("%Y-%m-%dT%H:%M:%S").to_string(),
        },
    });
    let from_scratch_ical = encode(&from_scratch, None, None, &options).unwrap();
    let from_scratch_tree = EventTree::split(&from_scratch_ical).unwrap();

    assert_eq!(*rrule, from_scratch_tree.master.property("RRULE").unwrap().value);
}
