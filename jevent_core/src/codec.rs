//! EventCodec (spec.md §4.9): the orchestrator. Drives a pass in either
//! direction, accumulates field errors under a path stack, enforces the
//! §3 invariants, and wires together every other codec in this crate.

use std::collections::HashSet;

use chrono::{NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

use jevent_ical::values::duration::Duration as IcalDuration;
use jevent_ical::values::recur::{Recur, Until};
use jevent_ical::values::{date_time, text};
use jevent_ical::{Component, EventTree, Ical, Property};

use crate::alert::{decode_alerts, encode_alerts, Alert};
use crate::error::{Error, PathStack, Result};
use crate::location::{decode_locations, encode_locations, end_location_id, end_time_zone, Location};
use crate::options::Options;
use crate::override_codec::{apply_patch, compute_span, decode_exdates, decode_rdates, diff_event, encode_exdates_and_rdates};
use crate::participant::{build_participants, encode_participants, Participant, Role};
use crate::recurrence::{reanchor_until_as_local_text, RecurrenceRule};
use crate::scalars::{decode_links, decode_related_to, encode_links, encode_related_to, Link, Status};
use crate::time::{LocalDateTime, TzBinding, UtcDateTime};
use crate::translation::{decode_translations, encode_translations};
use crate::tz_registry::TzRegistry;

const DEFAULT_PROD_ID: &str = "-//jevent-ical//translator//EN";

struct DecodedComponent {
    fields: Map<String, Value>,
    start_binding: TzBinding,
    start_naive: NaiveDateTime,
    end_naive: NaiveDateTime,
    recur: Option<Recur>,
}

/// Whether `field` should be decoded given `props_filter` (spec.md
/// §4.9/§6): no filter means everything is wanted; a present filter
/// means only the fields it names are. The handful of structural fields
/// every decode needs regardless (`start`, `timeZone`, `duration`, ...)
/// never go through this check.
fn field_wanted(props_filter: Option<&HashSet<String>>, field: &str) -> bool {
    props_filter.map_or(true, |filter| filter.contains(field))
}

/// Decodes one `VEVENT` (master or exception) into its JSON fields. The
/// `exception` flag suppresses `uid` and `recurrenceRule` (spec.md §4.8)
/// so the exception's JSON object never spuriously diffs those against
/// the master. `props_filter` gates each recognized optional field: an
/// unrequested field is skipped entirely rather than decoded and then
/// discarded, so an invalid value in a field nobody asked for can never
/// fail the pass (spec.md §4.9: "unchecked fields are not decoded but
/// never silently fail").
fn decode_component(
    component: &Component,
    exception: bool,
    options: &Options,
    props_filter: Option<&HashSet<String>>,
    path_stack: &mut PathStack,
) -> Result<DecodedComponent> {
    let registry = TzRegistry::new();

    let uid = component.property("UID").map(|p| p.value.clone());
    if !exception && uid.is_none() {
        return Err(Error::MissingUid);
    }

    let dtstart = component.property("DTSTART").ok_or_else(|| Error::invalid_ical("VEVENT missing DTSTART"))?;
    let is_all_day = dtstart.param("VALUE") == Some("DATE");

    let (start_naive, start_binding) = if is_all_day {
        let date = date_time::parse_date(&dtstart.value).map_err(|e| Error::invalid_ical(e.message))?;
        (date.and_hms_opt(0, 0, 0).expect("midnight is always valid"), TzBinding::Floating)
    } else {
        let (naive, is_utc) = date_time::parse_date_time(&dtstart.value).map_err(|e| Error::invalid_ical(e.message))?;
        if is_utc {
            (naive, TzBinding::Utc)
        } else if let Some(tzid) = dtstart.param("TZID") {
            (naive, TzBinding::Named(registry.lookup(tzid)?))
        } else {
            (naive, TzBinding::Floating)
        }
    };

    let locations = decode_locations(component, path_stack);

    let dtend_property = component.property("DTEND");
    let end_id = dtend_property.and_then(|p| p.param("X-JMAP-ID")).map(str::to_string);
    let cross_referenced_end_tz = end_time_zone(&locations, end_id.as_deref());

    let duration_seconds = if let Some(duration_property) = component.property("DURATION") {
        IcalDuration::parse(&duration_property.value).map_err(|e| Error::invalid_ical(e.message))?.to_signed_seconds()
    } else if let Some(dtend) = dtend_property {
        if is_all_day {
            let end_date = date_time::parse_date(&dtend.value).map_err(|e| Error::invalid_ical(e.message))?;
            let start_date = date_time::parse_date(&dtstart.value).map_err(|e| Error::invalid_ical(e.message))?;
            end_date.signed_duration_since(start_date).num_seconds()
        } else {
            let (end_naive_raw, end_is_utc) = date_time::parse_date_time(&dtend.value).map_err(|e| Error::invalid_ical(e.message))?;
            let end_binding = if end_is_utc {
                TzBinding::Utc
            } else if let Some(tzid) = dtend.param("TZID") {
                TzBinding::Named(registry.lookup(tzid)?)
            } else if let Some(tzid) = cross_referenced_end_tz {
                TzBinding::Named(registry.lookup(tzid)?)
            } else {
                TzBinding::Floating
            };
            let start_utc = LocalDateTime(start_naive).to_utc(&start_binding);
            let end_utc = LocalDateTime(end_naive_raw).to_utc(&end_binding);
            (end_utc - start_utc).num_seconds()
        }
    } else {
        0
    };

    let end_naive = start_naive + chrono::Duration::seconds(duration_seconds);

    let mut fields = Map::new();

    if !exception {
        fields.insert("uid".to_string(), Value::String(uid.expect("checked for Some above")));
    }

    fields.insert("isAllDay".to_string(), Value::Bool(is_all_day));
    fields.insert("start".to_string(), Value::String(LocalDateTime(start_naive).format()));
    fields.insert(
        "timeZone".to_string(),
        start_binding.iana_name().map(|name| Value::String(name.to_string())).unwrap_or(Value::Null),
    );
    fields.insert("duration".to_string(), Value::String(IcalDuration::from_signed_seconds(duration_seconds).format()));

    let wants_title = field_wanted(props_filter, "title");
    let wants_description = field_wanted(props_filter, "description");

    let mut language = None;

    if wants_title {
        if let Some(summary) = component.property("SUMMARY") {
            fields.insert("title".to_string(), Value::String(text::unescape(&summary.value)));
            language = language.or_else(|| summary.param("LANGUAGE").map(str::to_string));
        }
    }
    if wants_description {
        if let Some(description) = component.property("DESCRIPTION") {
            fields.insert("description".to_string(), Value::String(text::unescape(&description.value)));
            language = language.or_else(|| description.param("LANGUAGE").map(str::to_string));
        }
    }
    if let Some(language) = language {
        if field_wanted(props_filter, "language") {
            fields.insert("language".to_string(), Value::String(language));
        }
    }

    if field_wanted(props_filter, "created") {
        if let Some(created) = component.property("CREATED") {
            match UtcDateTime::parse(&created.value) {
                Ok(parsed) => {
                    fields.insert("created".to_string(), Value::String(parsed.format()));
                }
                Err(_) => path_stack.scoped("created", |stack| stack.record("invalid CREATED timestamp")),
            }
        }
    }
    if field_wanted(props_filter, "updated") {
        if let Some(modified) = component.property("LAST-MODIFIED") {
            match UtcDateTime::parse(&modified.value) {
                Ok(parsed) => {
                    fields.insert("updated".to_string(), Value::String(parsed.format()));
                }
                Err(_) => path_stack.scoped("updated", |stack| stack.record("invalid LAST-MODIFIED timestamp")),
            }
        }
    }
    if field_wanted(props_filter, "sequence") {
        if let Some(sequence) = component.property("SEQUENCE") {
            match sequence.value.parse::<u64>() {
                Ok(value) => {
                    fields.insert("sequence".to_string(), Value::Number(value.into()));
                }
                Err(_) => path_stack.scoped("sequence", |stack| stack.record("invalid SEQUENCE value")),
            }
        }
    }
    if field_wanted(props_filter, "status") {
        if let Some(status) = component.property("STATUS") {
            path_stack.scoped("status", |stack| {
                if let Some(status) = Status::parse(&status.value, stack) {
                    fields.insert("status".to_string(), serde_json::to_value(status).expect("Status always serializes"));
                }
            });
        }
    }
    if field_wanted(props_filter, "showAsFree") {
        if let Some(transp) = component.property("TRANSP") {
            fields.insert("showAsFree".to_string(), Value::Bool(transp.value.eq_ignore_ascii_case("TRANSPARENT")));
        }
    }

    if field_wanted(props_filter, "participants") {
        let organizer = component.property("ORGANIZER");
        let attendees: Vec<&Property> = component.properties_named("ATTENDEE").collect();
        let (participants, reply_to) = path_stack.scoped("participants", |stack| build_participants(organizer, &attendees, stack));
        fields.insert("participants".to_string(), participants_to_json(&participants, options));
        if let Some(reply_to) = reply_to {
            fields.insert("replyTo".to_string(), Value::String(reply_to));
        }
    }

    if field_wanted(props_filter, "locations") {
        fields.insert("locations".to_string(), locations_to_json(&locations));
    }

    if field_wanted(props_filter, "alerts") {
        let start_utc_for_alerts = if start_binding.is_floating() { None } else { Some(LocalDateTime(start_naive).to_utc(&start_binding)) };
        let alerts = path_stack.scoped("alerts", |stack| decode_alerts(component, start_utc_for_alerts, stack));
        fields.insert("alerts".to_string(), alerts_to_json(&alerts));
    }

    if field_wanted(props_filter, "links") {
        let links = path_stack.scoped("links", |stack| decode_links(component, stack));
        fields.insert("links".to_string(), links_to_json(&links));
    }

    if field_wanted(props_filter, "relatedTo") {
        let related_to = decode_related_to(component);
        if !related_to.is_empty() {
            fields.insert("relatedTo".to_string(), Value::Array(related_to.into_iter().map(Value::String).collect()));
        }
    }

    if field_wanted(props_filter, "translations") {
        if let Some(translations) = path_stack.scoped("translations", |stack| decode_translations(component, stack)) {
            fields.insert("translations".to_string(), translations);
        }
    }

    let mut recur = None;
    if !exception && field_wanted(props_filter, "recurrenceRule") {
        if let Some(rrule_property) = component.property("RRULE") {
            match Recur::parse(&rrule_property.value) {
                Ok(parsed) => {
                    let decoded_rule = path_stack.scoped("recurrenceRule", |stack| RecurrenceRule::from_ical(&parsed, &start_binding, stack))?;
                    fields.insert(
                        "recurrenceRule".to_string(),
                        serde_json::to_value(&decoded_rule).expect("RecurrenceRule always serializes"),
                    );
                    recur = Some(parsed);
                }
                Err(err) => path_stack.scoped("recurrenceRule", |stack| stack.record(err.message)),
            }
        }
    }

    Ok(DecodedComponent { fields, start_binding, start_naive, end_naive, recur })
}

fn resolve_time_zone_binding(time_zone_name: Option<&str>, registry: &TzRegistry) -> Result<TzBinding> {
    Ok(match time_zone_name {
        Some(name) if name.eq_ignore_ascii_case("UTC") => TzBinding::Utc,
        Some(name) => TzBinding::Named(registry.lookup(name)?),
        None => TzBinding::Floating,
    })
}

fn prior_start_binding(component: &Component, registry: &TzRegistry) -> Option<TzBinding> {
    let dtstart = component.property("DTSTART")?;
    if dtstart.param("VALUE") == Some("DATE") {
        return Some(TzBinding::Floating);
    }
    let (_, is_utc) = date_time::parse_date_time(&dtstart.value).ok()?;
    if is_utc {
        Some(TzBinding::Utc)
    } else if let Some(tzid) = dtstart.param("TZID") {
        registry.lookup(tzid).ok().map(TzBinding::Named)
    } else {
        Some(TzBinding::Floating)
    }
}

fn prior_rrule_until_utc(component: &Component) -> Option<NaiveDateTime> {
    let rrule = component.property("RRULE")?;
    let recur = Recur::parse(&rrule.value).ok()?;
    match recur.until? {
        Until::DateTime(naive, true) => Some(naive),
        _ => None,
    }
}

fn participants_to_json(participants: &[(String, Participant)], options: &Options) -> Value {
    if participants.is_empty() {
        return Value::Null;
    }
    let mut map = Map::new();
    for (id, participant) in participants {
        let mut value = serde_json::to_value(participant).unwrap_or(Value::Null);
        if options.is_you(&participant.email) {
            if let Value::Object(object) = &mut value {
                object.insert("isYou".to_string(), Value::Bool(true));
            }
        }
        map.insert(id.clone(), value);
    }
    Value::Object(map)
}

fn locations_to_json(locations: &[(String, Location)]) -> Value {
    if locations.is_empty() {
        return Value::Null;
    }
    let mut map = Map::new();
    for (id, location) in locations {
        map.insert(id.clone(), serde_json::to_value(location).unwrap_or(Value::Null));
    }
    Value::Object(map)
}

fn alerts_to_json(alerts: &[(String, Alert)]) -> Value {
    if alerts.is_empty() {
        return Value::Null;
    }
    let mut map = Map::new();
    for (id, alert) in alerts {
        map.insert(id.clone(), serde_json::to_value(alert).unwrap_or(Value::Null));
    }
    Value::Object(map)
}

fn links_to_json(links: &[(String, Link)]) -> Value {
    if links.is_empty() {
        return Value::Null;
    }
    let mut map = Map::new();
    for (id, link) in links {
        map.insert(id.clone(), serde_json::to_value(link).unwrap_or(Value::Null));
    }
    Value::Object(map)
}

/// Decodes the master event and every recurrence exception, diffing each
/// exception against the master to build `recurrenceOverrides`. Each
/// optional field, including `recurrenceOverrides` itself, is skipped
/// entirely when `props_filter` doesn't want it (spec.md §4.9/§6).
pub fn decode(ical: &Ical, props_filter: Option<&HashSet<String>>, options: &Options) -> Result<Value> {
    let tree = EventTree::split(ical).ok_or_else(|| Error::invalid_ical("calendar contains no VEVENT"))?;

    let mut path_stack = PathStack::new();

    let master = decode_component(tree.master, false, options, props_filter, &mut path_stack)?;

    let wants_overrides = field_wanted(props_filter, "recurrenceOverrides");

    let mut overrides = Map::new();

    if wants_overrides {
        for key in decode_exdates(tree.master, &master.start_binding) {
            overrides.insert(key, Value::Null);
        }

        let master_duration_seconds = (master.end_naive - master.start_naive).num_seconds();
        for (key, patch) in decode_rdates(tree.master, &master.start_binding, Some(master_duration_seconds)) {
            overrides.insert(key, patch);
        }
    }

    let exceptions: &[&Component] = if wants_overrides { &tree.exceptions } else { &[] };
    for exception_component in exceptions {
        let recurrence_id = exception_component
            .property("RECURRENCE-ID")
            .ok_or_else(|| Error::invalid_ical("exception VEVENT missing RECURRENCE-ID"))?;
        let (naive, is_utc) = date_time::parse_date_time(&recurrence_id.value).map_err(|e| Error::invalid_ical(e.message))?;
        let key = if is_utc {
            match &master.start_binding {
                TzBinding::Named(tz) => UtcDateTime(naive).to_local_in(tz).format(),
                _ => LocalDateTime(naive).format(),
            }
        } else {
            LocalDateTime(naive).format()
        };

        let segment = format!("recurrenceOverrides[{key:?}]");
        let exception = path_stack.scoped(segment, |stack| decode_component(exception_component, true, options, props_filter, stack))?;

        // `exception.fields` never carries `uid`/`recurrenceRule` (the
        // `exception` flag above suppresses both) and shouldn't diff
        // against the master's `sequence` either - strip all three from
        // the master side so the diff can't manufacture a spurious
        // nullification entry for a key neither side is actually comparing.
        let mut diff_master_fields = master.fields.clone();
        diff_master_fields.remove("uid");
        diff_master_fields.remove("recurrenceRule");
        diff_master_fields.remove("sequence");
        let master_value = Value::Object(diff_master_fields);
        let exception_value = Value::Object(exception.fields.clone());
        overrides.insert(key, diff_event(&master_value, &exception_value));
    }

    let mut event = master.fields;

    if field_wanted(props_filter, "prodId") {
        if let Some(prodid) = ical.property("PRODID") {
            event.insert("prodId".to_string(), Value::String(text::unescape(&prodid.value)));
        }
    }

    if wants_overrides && !overrides.is_empty() {
        event.insert("recurrenceOverrides".to_string(), Value::Object(overrides));
    }

    path_stack.into_result()?;

    Ok(Value::Object(event))
}

struct EncodedComponent {
    component: Component,
    start_binding: TzBinding,
    end_binding: TzBinding,
    start_naive: NaiveDateTime,
    end_naive: NaiveDateTime,
    recur: Option<Recur>,
}

/// Encodes one JSON event object (master or an override's merged object)
/// into a `VEVENT`. `exception` suppresses `uid`/`recurrenceRule`
/// emission, the inverse of `decode_component`'s suppression.
fn encode_component(event: &Value, exception: bool, options: &Options, path_stack: &mut PathStack) -> Result<EncodedComponent> {
    let registry = TzRegistry::new();
    let map = event.as_object().cloned().unwrap_or_default();

    let mut component = Component::new("VEVENT");

    if !exception {
        let uid = map.get("uid").and_then(Value::as_str).ok_or(Error::MissingUid)?;
        component.push_property(Property::new("UID", uid));
    }

    let is_all_day = map.get("isAllDay").and_then(Value::as_bool).unwrap_or(false);

    let start_raw = map.get("start").and_then(Value::as_str).ok_or_else(|| Error::invalid_ical("event is missing start"))?;
    let start_local = LocalDateTime::parse(start_raw)?;

    let time_zone_name = map.get("timeZone").and_then(Value::as_str);
    let start_binding = resolve_time_zone_binding(time_zone_name, &registry)?;

    if is_all_day {
        if !start_binding.is_floating() {
            path_stack.scoped("timeZone", |stack| stack.record("an all-day event's timeZone must be null"));
        }
        if start_local.0.time() != NaiveTime::MIN {
            path_stack.scoped("start", |stack| stack.record("an all-day event's start must have a zero time component"));
        }
    }

    let dtstart_property = if is_all_day {
        let mut property = Property::new("DTSTART", date_time::format_date(&start_local.0.date()));
        property.set_param("VALUE", "DATE");
        property
    } else {
        match &start_binding {
            TzBinding::Floating => Property::new("DTSTART", date_time::format_date_time(&start_local.0, false)),
            TzBinding::Utc => Property::new("DTSTART", date_time::format_date_time(&start_local.to_utc(&start_binding).naive_utc(), true)),
            TzBinding::Named(tz) => {
                let mut property = Property::new("DTSTART", date_time::format_date_time(&start_local.0, false));
                property.set_param("TZID", tz.name());
                property
            }
        }
    };
    component.push_property(dtstart_property);

    let duration_raw = map.get("duration").and_then(Value::as_str).unwrap_or("P0D");
    let duration = IcalDuration::parse(duration_raw).map_err(|e| Error::invalid_ical(e.message))?;
    if is_all_day && duration.has_time_component() {
        path_stack.scoped("duration", |stack| stack.record("an all-day event's duration must have no time component"));
    }
    let duration_seconds = duration.to_signed_seconds();

    let locations: Vec<(String, Location)> = map
        .get("locations")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(id, value)| serde_json::from_value::<Location>(value.clone()).ok().map(|location| (id.clone(), location)))
                .collect()
        })
        .unwrap_or_default();

    let end_zone_name = end_time_zone(&locations, None);

    let (end_binding, emits_dtend) = match end_zone_name {
        Some(name) if !start_binding.is_floating() => match registry.lookup(name) {
            Ok(tz) => (TzBinding::Named(tz), true),
            Err(_) => (start_binding.clone(), false),
        },
        _ => (start_binding.clone(), false),
    };

    if emits_dtend {
        let end_utc = start_local.to_utc(&start_binding) + chrono::Duration::seconds(duration_seconds);
        let end_local = match &end_binding {
            TzBinding::Named(tz) => UtcDateTime(end_utc.naive_utc()).to_local_in(tz),
            _ => LocalDateTime(end_utc.naive_utc()),
        };
        let mut end_property = Property::new("DTEND", date_time::format_date_time(&end_local.0, false));
        if let TzBinding::Named(tz) = &end_binding {
            end_property.set_param("TZID", tz.name());
        }
        if let Some(end_id) = end_location_id(&locations) {
            end_property.set_param("X-JMAP-ID", end_id.to_string());
        }
        component.push_property(end_property);
    } else {
        component.push_property(Property::new("DURATION", duration.format()));
    }

    if let Some(title) = map.get("title").and_then(Value::as_str) {
        let mut property = Property::new("SUMMARY", text::escape(title));
        if let Some(language) = map.get("language").and_then(Value::as_str) {
            property.set_param("LANGUAGE", language);
        }
        component.push_property(property);
    }
    if let Some(description) = map.get("description").and_then(Value::as_str) {
        component.push_property(Property::new("DESCRIPTION", text::escape(description)));
    }

    if let Some(created) = map.get("created").and_then(Value::as_str) {
        match UtcDateTime::parse(created) {
            Ok(parsed) => {
                component.push_property(Property::new("CREATED", parsed.format()));
            }
            Err(_) => path_stack.scoped("created", |stack| stack.record("invalid created timestamp")),
        }
    }
    if let Some(updated) = map.get("updated").and_then(Value::as_str) {
        match UtcDateTime::parse(updated) {
            Ok(parsed) => {
                component.push_property(Property::new("LAST-MODIFIED", parsed.format()));
            }
            Err(_) => path_stack.scoped("updated", |stack| stack.record("invalid updated timestamp")),
        }
    }
    if let Some(sequence) = map.get("sequence").and_then(Value::as_u64) {
        component.push_property(Property::new("SEQUENCE", sequence.to_string()));
    }
    if let Some(status_value) = map.get("status") {
        match serde_json::from_value::<Status>(status_value.clone()) {
            Ok(status) => {
                component.push_property(Property::new("STATUS", status.format()));
            }
            Err(_) => path_stack.scoped("status", |stack| stack.record("unrecognized status value")),
        }
    }
    if let Some(show_as_free) = map.get("showAsFree").and_then(Value::as_bool) {
        component.push_property(Property::new("TRANSP", if show_as_free { "TRANSPARENT" } else { "OPAQUE" }));
    }

    let participants: Vec<(String, Participant)> = map
        .get("participants")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(id, value)| serde_json::from_value::<Participant>(value.clone()).ok().map(|p| (id.clone(), p)))
                .collect()
        })
        .unwrap_or_default();

    for (id, participant) in &participants {
        if participant.roles.is_empty() {
            let segment = format!("participants[{id:?}].roles");
            path_stack.scoped(segment, |stack| stack.record("roles must be non-empty"));
        }
    }

    let has_owner = participants.iter().any(|(_, p)| p.roles.contains(&Role::Owner));
    let has_non_owner = participants.iter().any(|(_, p)| !p.roles.contains(&Role::Owner));
    let reply_to = map.get("replyTo").and_then(Value::as_str);

    if reply_to.is_some() != (has_owner && has_non_owner) {
        path_stack.scoped("replyTo", |stack| stack.record("replyTo must be present iff both an owner and a non-owner participant exist"));
    }

    let (organizer_property, attendee_properties) = encode_participants(&participants);
    if let Some(mut organizer_property) = organizer_property {
        if let Some(reply_to) = reply_to {
            organizer_property.set_param("X-JMAP-REPLY-TO", reply_to);
        }
        component.push_property(organizer_property);
    }
    for attendee in attendee_properties {
        component.push_property(attendee);
    }

    for property in encode_locations(&locations) {
        component.push_property(property);
    }

    let alerts: Vec<(String, Alert)> = map
        .get("alerts")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().filter_map(|(id, value)| serde_json::from_value::<Alert>(value.clone()).ok().map(|a| (id.clone(), a))).collect())
        .unwrap_or_default();
    let summary = map.get("title").and_then(Value::as_str);
    let alarms = path_stack.scoped("alerts", |stack| encode_alerts(&alerts, summary, stack));
    for alarm in alarms {
        component.push_component(alarm);
    }

    let links: Vec<(String, Link)> = map
        .get("links")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().filter_map(|(id, value)| serde_json::from_value::<Link>(value.clone()).ok().map(|l| (id.clone(), l))).collect())
        .unwrap_or_default();
    for property in encode_links(&links) {
        component.push_property(property);
    }

    if let Some(related_to) = map.get("relatedTo").and_then(Value::as_array) {
        let related_to: Vec<String> = related_to.iter().filter_map(Value::as_str).map(str::to_string).collect();
        for property in encode_related_to(&related_to) {
            component.push_property(property);
        }
    }

    if let Some(translations) = map.get("translations") {
        if !translations.is_null() {
            let properties = path_stack.scoped("translations", |stack| encode_translations(translations, stack));
            for property in properties {
                component.push_property(property);
            }
        }
    }

    let mut recur = None;
    if !exception {
        if let Some(rule_value) = map.get("recurrenceRule") {
            if !rule_value.is_null() {
                match serde_json::from_value::<RecurrenceRule>(rule_value.clone()) {
                    Ok(rule) => {
                        let recur_value = path_stack.scoped("recurrenceRule", |stack| rule.to_ical(&start_binding, stack))?;
                        component.push_property(Property::new("RRULE", recur_value.format()));
                        recur = Some(recur_value);
                    }
                    Err(err) => path_stack.scoped("recurrenceRule", |stack| stack.record(err.to_string())),
                }
            }
        }
    }

    let end_naive = start_local.0 + chrono::Duration::seconds(duration_seconds);

    Ok(EncodedComponent {
        component,
        start_binding,
        end_binding,
        start_naive: start_local.0,
        end_naive,
        recur,
    })
}

fn encode_recurrence_id(key: &str, master_binding: &TzBinding) -> Result<Property> {
    let local = LocalDateTime::parse(key)?;

    Ok(match master_binding {
        TzBinding::Floating => Property::new("RECURRENCE-ID", date_time::format_date_time(&local.0, false)),
        TzBinding::Utc => Property::new("RECURRENCE-ID", date_time::format_date_time(&local.to_utc(master_binding).naive_utc(), true)),
        TzBinding::Named(tz) => {
            let mut property = Property::new("RECURRENCE-ID", date_time::format_date_time(&local.0, false));
            property.set_param("TZID", tz.name());
            property
        }
    })
}

/// Builds or updates a master `VEVENT` plus its exceptions and
/// `VTIMEZONE` components from a JSON event object (spec.md §4.9's
/// CREATE/UPDATE/EXCEPTION state machine: CREATE when `prior` is absent,
/// UPDATE when present - `sequence` auto-increments either way once a
/// prior exists).
pub fn encode(event: &Value, prior: Option<&Ical>, uid: Option<&str>, options: &Options) -> Result<Ical> {
    let event_map = event.as_object().ok_or_else(|| Error::invalid_ical("event must be a JSON object"))?.clone();

    let prior_tree = prior.and_then(EventTree::split);

    let prior_uid = prior_tree.as_ref().and_then(|tree| tree.master.property("UID")).map(|p| p.value.clone());
    let resolved_uid = event_map
        .get("uid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(prior_uid)
        .or_else(|| uid.map(str::to_string))
        .ok_or(Error::MissingUid)?;

    let prior_sequence = prior_tree.as_ref().and_then(|tree| tree.master.property("SEQUENCE")).and_then(|p| p.value.parse::<u64>().ok());
    let sequence = match prior_sequence {
        Some(previous) => previous + 1,
        None => event_map.get("sequence").and_then(Value::as_u64).unwrap_or(0),
    };

    let mut master_map = event_map.clone();
    master_map.remove("recurrenceOverrides");
    master_map.insert("uid".to_string(), Value::String(resolved_uid.clone()));
    master_map.insert("sequence".to_string(), Value::Number(sequence.into()));

    // An update that changes the start timezone leaves a previously stored
    // `until` expressed in the old zone's wall clock; re-anchor it to the
    // new zone rather than silently reinterpreting the same digits.
    if let Some(prior_tree) = &prior_tree {
        let registry = TzRegistry::new();
        if let (Some(old_binding), Some(until_utc_naive)) =
            (prior_start_binding(prior_tree.master, &registry), prior_rrule_until_utc(prior_tree.master))
        {
            let new_time_zone_name = master_map.get("timeZone").and_then(Value::as_str);
            if let Ok(new_binding) = resolve_time_zone_binding(new_time_zone_name, &registry) {
                if new_binding != old_binding {
                    if let Some(Value::Object(rule)) = master_map.get_mut("recurrenceRule") {
                        if rule.get("until").and_then(Value::as_str).is_some() {
                            let reanchored = reanchor_until_as_local_text(UtcDateTime(until_utc_naive), &old_binding, &new_binding);
                            rule.insert("until".to_string(), Value::String(reanchored));
                        }
                    }
                }
            }
        }
    }

    let master_value = Value::Object(master_map);

    let mut path_stack = PathStack::new();

    let master_encoded = encode_component(&master_value, false, options, &mut path_stack)?;
    let mut master_component = master_encoded.component;

    let mut zone_names: HashSet<String> = HashSet::new();
    if let Some(name) = master_encoded.start_binding.iana_name() {
        zone_names.insert(name.to_string());
    }
    if let Some(name) = master_encoded.end_binding.iana_name() {
        zone_names.insert(name.to_string());
    }

    let mut exception_components = Vec::new();
    let mut exception_spans = Vec::new();
    let mut null_and_bare_overrides = Map::new();

    if let Some(Value::Object(overrides)) = event_map.get("recurrenceOverrides") {
        for (key, patch) in overrides {
            match patch {
                Value::Null => {
                    null_and_bare_overrides.insert(key.clone(), Value::Null);
                }
                Value::Object(patch_map) if patch_map.is_empty() => {
                    null_and_bare_overrides.insert(key.clone(), Value::Object(Map::new()));
                }
                Value::Object(_) => {
                    let merged = apply_patch(&master_value, patch);
                    let mut merged_map = merged.as_object().cloned().unwrap_or_default();
                    merged_map.remove("uid");
                    merged_map.remove("recurrenceRule");
                    merged_map.remove("recurrenceOverrides");
                    merged_map.remove("sequence");
                    let merged_value = Value::Object(merged_map);

                    let segment = format!("recurrenceOverrides[{key:?}]");
                    let exception_encoded = path_stack.scoped(segment, |stack| encode_component(&merged_value, true, options, stack))?;

                    let mut exception_component = exception_encoded.component;
                    exception_component.push_property(Property::new("UID", resolved_uid.clone()));
                    exception_component.push_property(encode_recurrence_id(key, &master_encoded.start_binding)?);

                    if let Some(name) = exception_encoded.start_binding.iana_name() {
                        zone_names.insert(name.to_string());
                    }
                    if let Some(name) = exception_encoded.end_binding.iana_name() {
                        zone_names.insert(name.to_string());
                    }

                    exception_spans.push((exception_encoded.start_naive, exception_encoded.end_naive));
                    exception_components.push(exception_component);
                }
                _ => {
                    let segment = format!("recurrenceOverrides[{key:?}]");
                    path_stack.scoped(segment, |stack| stack.record("override value must be null or an object"));
                }
            }
        }
    }

    let (exdate_properties, rdate_properties) = encode_exdates_and_rdates(&null_and_bare_overrides, &master_encoded.start_binding);
    for property in exdate_properties {
        master_component.push_property(property);
    }
    for property in rdate_properties {
        master_component.push_property(property);
    }

    let (span_start, span_end) = compute_span(
        master_encoded.recur.as_ref(),
        master_encoded.start_naive,
        master_encoded.end_naive,
        &exception_spans,
    );

    path_stack.into_result()?;

    let mut calendar = Component::new("VCALENDAR");
    calendar.push_property(Property::new("VERSION", "2.0"));

    let prod_id = event_map
        .get("prodId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| prior.and_then(|ical| ical.property("PRODID")).map(|p| text::unescape(&p.value)))
        .unwrap_or_else(|| DEFAULT_PROD_ID.to_string());
    calendar.push_property(Property::new("PRODID", prod_id));

    calendar.push_component(master_component);
    for exception_component in exception_components {
        calendar.push_component(exception_component);
    }

    let registry = TzRegistry::new();
    let mut zone_names: Vec<String> = zone_names.into_iter().collect();
    zone_names.sort();
    for name in &zone_names {
        if let Ok(tz) = registry.lookup(name) {
            calendar.push_component(registry.emit_vtimezone(name, tz, span_start, span_end));
        }
    }

    if let Some(prior_ical) = prior {
        for prior_vtimezone in prior_ical.components_named("VTIMEZONE") {
            if let Some(tzid) = prior_vtimezone.property("TZID") {
                if registry.lookup(&tzid.value).is_err() {
                    calendar.push_component(prior_vtimezone.clone());
                }
            }
        }
    }

    Ok(calendar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_minimal_timed_event() {
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
        assert!(ical.components_named("VTIMEZONE").any(|tz| tz.property("TZID").map(|p| p.value.as_str()) == Some("Europe/Berlin")));
    }

    #[test]
    fn encodes_all_day_event_as_date_only() {
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
    }

    #[test]
    fn decode_round_trips_minimal_event() {
        let event = json!({
            "uid": "A",
            "start": "2024-03-10T09:00:00",
            "timeZone": "Europe/Berlin",
            "duration": "PT1H",
            "title": "x",
        });
        let options = Options::new();
        let ical = encode(&event, None, None, &options).unwrap();
        let decoded = decode(&ical, None, &options).unwrap();

        assert_eq!(decoded["uid"], "A");
        assert_eq!(decoded["start"], "2024-03-10T09:00:00");
        assert_eq!(decoded["timeZone"], "Europe/Berlin");
        assert_eq!(decoded["duration"], "PT1H");
        assert_eq!(decoded["title"], "x");
        assert_eq!(decoded["locations"], Value::Null);
    }

    #[test]
    fn weekly_recurrence_with_cancellation_emits_exdate_only() {
        let event = json!({
            "uid": "C",
            "start": "2024-03-11T09:00:00",
            "timeZone": "Europe/Berlin",
            "duration": "PT1H",
            "recurrenceRule": {"frequency": "weekly", "byDay": [{"weekday": "mo"}]},
            "recurrenceOverrides": {"2024-03-18T09:00:00": null},
        });
        let options = Options::new();
        let ical = encode(&event, None, None, &options).unwrap();
        let tree = EventTree::split(&ical).unwrap();

        assert!(tree.master.property("EXDATE").is_some());
        assert!(tree.exceptions.is_empty());
    }

    #[test]
    fn missing_uid_without_prior_or_param_fails() {
        let event = json!({"start": "2024-03-10T09:00:00", "duration": "PT1H"});
        let options = Options::new();
        assert!(matches!(encode(&event, None, None, &options), Err(Error::MissingUid)));
    }

    #[test]
    fn props_filter_restricts_decoded_fields() {
        let event = json!({
            "uid": "A",
            "start": "2024-03-10T09:00:00",
            "timeZone": "Europe/Berlin",
            "duration": "PT1H",
            "title": "x",
            "description": "long text",
        });
        let options = Options::new();
        let ical = encode(&event, None, None, &options).unwrap();

        let mut filter = HashSet::new();
        filter.insert("title".to_string());
        let decoded = decode(&ical, Some(&filter), &options).unwrap();

        assert_eq!(decoded["title"], "x");
        assert!(decoded.get("description").is_none());
        assert_eq!(decoded["uid"], "A");
    }
}
