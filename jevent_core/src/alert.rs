//! AlertCodec (spec.md §4.6): translates alarms with relative triggers
//! and email/display actions.

use serde::{Deserialize, Serialize};

use jevent_ical::tree::{Component, Property};
use jevent_ical::values::duration::Duration as IcalDuration;

use crate::error::PathStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelativeTo {
    BeforeStart,
    AfterStart,
    BeforeEnd,
    AfterEnd,
}

impl RelativeTo {
    fn is_related_to_end(&self) -> bool {
        matches!(self, RelativeTo::BeforeEnd | RelativeTo::AfterEnd)
    }

    fn is_before(&self) -> bool {
        matches!(self, RelativeTo::BeforeStart | RelativeTo::BeforeEnd)
    }

    fn from_flags(related_to_end: bool, negative: bool) -> Self {
        match (related_to_end, negative) {
            (false, true) => RelativeTo::BeforeStart,
            (false, false) => RelativeTo::AfterStart,
            (true, true) => RelativeTo::BeforeEnd,
            (true, false) => RelativeTo::AfterEnd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Email {
        to: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(rename = "textBody", skip_serializing_if = "Option::is_none")]
        text_body: Option<String>,
    },
    Display,
    /// Any action this codec doesn't translate (spec.md §4.6's policy:
    /// never trigger an unknown action, never delete one from the
    /// decoded model). `raw` carries the untranslated ACTION value.
    #[serde(rename = "unknown")]
    Unknown { raw: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Signed ISO-8601 duration (spec.md §3/§6); the sign mirrors
    /// `relativeTo`'s before/after half.
    pub offset: String,
    #[serde(rename = "relativeTo")]
    pub relative_to: RelativeTo,
    pub action: Action,
}

/// Decodes every `VALARM` sub-component of `component` into ordered
/// `(id, Alert)` pairs. `start_utc` is the master event's start in UTC,
/// used only when a trigger is an absolute date-time rather than a
/// relative duration (spec.md §4.6/§9: computed relative to the event's
/// start and left floating with no computation when the event itself
/// floats, per the open question's "no default zone is invented"
/// resolution).
pub fn decode_alerts(component: &Component, start_utc: Option<chrono::DateTime<chrono::Utc>>, path_stack: &mut PathStack) -> Vec<(String, Alert)> {
    use chrono::TimeZone;

    let mut alerts = Vec::new();

    for (index, valarm) in component.components_named("VALARM").enumerate() {
        let id = valarm
            .property("X-JMAP-ID")
            .map(|p| p.value.clone())
            .unwrap_or_else(|| format!("alert-{index}"));

        path_stack.scoped(format!("alerts[{id:?}]"), |stack| {
            let Some(trigger) = valarm.property("TRIGGER") else {
                stack.record("VALARM missing TRIGGER");
                return;
            };

            let related_to_end = trigger.param("RELATED") == Some("END");

            let (offset_duration, relative_to) = if trigger.param("VALUE") == Some("DATE-TIME") {
                // Absolute trigger: read as an already-`Z`-suffixed UTC
                // instant and diff against the event's start.
                match jevent_ical::values::date_time::parse_date_time(&trigger.value) {
                    Ok((naive, _is_utc)) => {
                        let Some(start_utc) = start_utc else {
                            // Floating event: never invent a default
                            // zone (spec.md §9's open question).
                            stack.record("cannot resolve absolute trigger against a floating event");
                            return;
                        };
                        let trigger_utc = chrono::Utc.from_utc_datetime(&naive);
                        let seconds = (trigger_utc - start_utc).num_seconds();
                        (IcalDuration::from_signed_seconds(seconds), RelativeTo::from_flags(false, seconds < 0))
                    }
                    Err(_) => {
                        stack.record("invalid absolute TRIGGER value");
                        return;
                    }
                }
            } else {
                match IcalDuration::parse(&trigger.value) {
                    Ok(duration) => {
                        let relative_to = RelativeTo::from_flags(related_to_end, duration.negative);
                        (duration, relative_to)
                    }
                    Err(_) => {
                        stack.record("invalid relative TRIGGER duration");
                        return;
                    }
                }
            };

            let action = decode_action(valarm, stack);

            alerts.push((
                id,
                Alert {
                    offset: offset_duration.format(),
                    relative_to,
                    action,
                },
            ));
        });
    }

    alerts
}

fn decode_action(valarm: &Component, path_stack: &mut PathStack) -> Action {
    let Some(action_property) = valarm.property("ACTION") else {
        path_stack.record("VALARM missing ACTION");
        return Action::Unknown { raw: String::new() };
    };

    match action_property.value.as_str() {
        "EMAIL" => {
            let to = valarm
                .properties_named("ATTENDEE")
                .map(|p| jevent_ical::values::cal_address::canonicalize_email(&p.value))
                .collect();
            let subject = valarm.property("SUMMARY").map(|p| jevent_ical::values::text::unescape(&p.value));
            let text_body = valarm.property("DESCRIPTION").map(|p| jevent_ical::values::text::unescape(&p.value));
            Action::Email { to, subject, text_body }
        }
        "DISPLAY" => Action::Display,
        other => Action::Unknown { raw: other.to_string() },
    }
}

/// Encodes the ordered alert map into `VALARM` sub-components, skipping
/// any alert whose action this codec doesn't translate (spec.md §4.6:
/// "never trigger an unknown action" - the alert is preserved in the
/// decoded JSON model but produces no live alarm on encode).
pub fn encode_alerts(alerts: &[(String, Alert)], summary: Option<&str>, path_stack: &mut PathStack) -> Vec<Component> {
    let mut components = Vec::new();

    for (id, alert) in alerts {
        path_stack.scoped(format!("alerts[{id:?}]"), |stack| {
            let action_property = match &alert.action {
                Action::Email { to, .. } if to.is_empty() => {
                    stack.scoped("action.to", |s| s.record("email action requires a non-empty recipient list"));
                    return;
                }
                Action::Email { .. } => Property::new("ACTION", "EMAIL"),
                Action::Display => Property::new("ACTION", "DISPLAY"),
                Action::Unknown { .. } => return,
            };

            let Ok(mut base_duration) = IcalDuration::parse(&alert.offset) else {
                stack.record("invalid offset duration");
                return;
            };
            base_duration.negative = alert.relative_to.is_before();

            let mut trigger = Property::new("TRIGGER", base_duration.format());
            if alert.relative_to.is_related_to_end() {
                trigger.set_param("RELATED", "END");
            }

            let mut valarm = Component::new("VALARM");
            valarm.push_property(Property::new("X-JMAP-ID", id.clone()));
            valarm.push_property(trigger);
            valarm.push_property(action_property);

            match &alert.action {
                Action::Email { to, subject, text_body } => {
                    for recipient in to {
                        valarm.push_property(Property::new("ATTENDEE", jevent_ical::values::cal_address::to_cal_address(recipient)));
                    }
                    if let Some(subject) = subject {
                        valarm.push_property(Property::new("SUMMARY", jevent_ical::values::text::escape(subject)));
                    }
                    if let Some(text_body) = text_body {
                        valarm.push_property(Property::new("DESCRIPTION", jevent_ical::values::text::escape(text_body)));
                    }
                }
                Action::Display => {
                    let description = summary.unwrap_or_default();
                    valarm.push_property(Property::new("DESCRIPTION", jevent_ical::values::text::escape(description)));
                }
                Action::Unknown { .. } => unreachable!(),
            }

            components.push(valarm);
        });
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_before_start_trigger_as_negative_related_start() {
        let alerts = vec![(
            "a1".to_string(),
            Alert {
                offset: "PT15M".to_string(),
                relative_to: RelativeTo::BeforeStart,
                action: Action::Display,
            },
        )];
        let mut path_stack = PathStack::new();
        let components = encode_alerts(&alerts, Some("Standup"), &mut path_stack);
        assert_eq!(components.len(), 1);
        let trigger = components[0].property("TRIGGER").unwrap();
        assert_eq!(trigger.value, "-PT15M");
        assert!(trigger.param("RELATED").is_none());
    }

    #[test]
    fn encodes_after_end_trigger_with_related_end() {
        let alerts = vec![(
            "a1".to_string(),
            Alert {
                offset: "PT5M".to_string(),
                relative_to: RelativeTo::AfterEnd,
                action: Action::Display,
            },
        )];
        let mut path_stack = PathStack::new();
        let components = encode_alerts(&alerts, None, &mut path_stack);
        let trigger = components[0].property("TRIGGER").unwrap();
        assert_eq!(trigger.value, "PT5M");
        assert_eq!(trigger.param("RELATED"), Some("END"));
    }

    #[test]
    fn email_action_requires_recipients() {
        let alerts = vec![(
            "a1".to_string(),
            Alert {
                offset: "PT15M".to_string(),
                relative_to: RelativeTo::BeforeStart,
                action: Action::Email { to: vec![], subject: None, text_body: None },
            },
        )];
        let mut path_stack = PathStack::new();
        let components = encode_alerts(&alerts, None, &mut path_stack);
        assert!(components.is_empty());
        assert!(!path_stack.is_empty());
    }

    #[test]
    fn relative_trigger_round_trips() {
        let mut component = Component::new("VEVENT");
        let mut valarm = Component::new("VALARM");
        valarm.push_property(Property::new("X-JMAP-ID", "a1"));
        let mut trigger = Property::new("TRIGGER", "-PT15M");
        trigger.set_param("RELATED", "START");
        valarm.push_property(trigger);
        valarm.push_property(Property::new("ACTION", "DISPLAY"));
        component.push_component(valarm);

        let mut path_stack = PathStack::new();
        let decoded = decode_alerts(&component, None, &mut path_stack);
        assert_eq!(decoded[0].1.relative_to, RelativeTo::BeforeStart);
        assert_eq!(decoded[0].1.offset, "-PT15M");
    }
}
