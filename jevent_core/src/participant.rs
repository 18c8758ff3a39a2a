//! ParticipantCodec (spec.md §4.4): builds the keyed participant map from
//! the organizer property and the attendee list, and resolves delegation
//! chains.
//!
//! Modeled as an arena (`Vec<Participant>`) plus a lookup map from
//! canonical email to index, per spec.md §9's "Pointer graphs / shared
//! ownership" design note - the same shape the teacher uses for its
//! inverted indices (`redical_core/src/inverted_index.rs`), adapted here
//! to a directed delegation graph instead of a search index.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use jevent_ical::tree::Property;
use jevent_ical::values::cal_address::{canonicalize_email, to_cal_address};

use crate::error::PathStack;
use crate::time::UtcDateTime;

const MAX_DELEGATION_HOPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    Individual,
    Group,
    Resource,
    Location,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Attendee,
    Chair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulePriority {
    Required,
    Optional,
    NonParticipant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParticipantKind>,
    pub roles: Vec<Role>,
    #[serde(rename = "scheduleStatus", skip_serializing_if = "Option::is_none")]
    pub schedule_status: Option<ScheduleStatus>,
    #[serde(rename = "schedulePriority", skip_serializing_if = "Option::is_none")]
    pub schedule_priority: Option<SchedulePriority>,
    #[serde(rename = "scheduleRSVP", skip_serializing_if = "Option::is_none")]
    pub schedule_rsvp: Option<bool>,
    #[serde(rename = "scheduleUpdated", skip_serializing_if = "Option::is_none")]
    pub schedule_updated: Option<String>,

    /// Raw DELEGATED-TO address, kept only long enough to resolve the
    /// delegation chain below; never serialized into JSON.
    #[serde(skip)]
    delegated_to: Option<String>,
}

impl Participant {
    fn new(email: String) -> Self {
        Participant {
            email,
            name: None,
            kind: None,
            roles: Vec::new(),
            schedule_status: None,
            schedule_priority: None,
            schedule_rsvp: None,
            schedule_updated: None,
            delegated_to: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParticipantArena {
    participants: Vec<Participant>,
    index_by_email: HashMap<String, usize>,
}

impl ParticipantArena {
    fn entry(&mut self, canonical_email: &str) -> usize {
        if let Some(&index) = self.index_by_email.get(canonical_email) {
            return index;
        }

        let index = self.participants.len();
        self.participants.push(Participant::new(canonical_email.to_string()));
        self.index_by_email.insert(canonical_email.to_string(), index);
        index
    }

    /// Resolves a DELEGATED-TO chain starting at `start`, following links
    /// through the arena for at most `MAX_DELEGATION_HOPS` hops. Falls
    /// back to `needs-action` on a loop or a miss (spec.md §4.4).
    fn resolve_schedule_status(&self, start: usize) -> Option<ScheduleStatus> {
        let mut visited = std::collections::HashSet::new();
        let mut current = start;

        for _ in 0..MAX_DELEGATION_HOPS {
            if !visited.insert(current) {
                return Some(ScheduleStatus::NeedsAction);
            }

            let participant = &self.participants[current];

            let Some(delegate_email) = &participant.delegated_to else {
                return participant.schedule_status;
            };

            let Some(&next_index) = self.index_by_email.get(delegate_email) else {
                return Some(ScheduleStatus::NeedsAction);
            };

            current = next_index;
        }

        Some(ScheduleStatus::NeedsAction)
    }

    pub fn into_ordered_entries(self) -> Vec<(String, Participant)> {
        self.participants
            .into_iter()
            .map(|mut participant| {
                let id = participant.email.clone();
                participant.delegated_to = None;
                (id, participant)
            })
            .collect()
    }
}

/// Builds the keyed participant map from an ORGANIZER property and the
/// ATTENDEE property list. Organizer and attendee sharing an address are
/// merged, the organizer gaining the `owner` role (spec.md §4.4).
pub fn build_participants(
    organizer: Option<&Property>,
    attendees: &[&Property],
    path_stack: &mut PathStack,
) -> (Vec<(String, Participant)>, Option<String>) {
    let mut arena = ParticipantArena::default();
    let mut reply_to = None;

    if let Some(organizer_property) = organizer {
        let canonical = canonicalize_email(&organizer_property.value);
        reply_to = organizer_property.param("X-JMAP-REPLY-TO").map(str::to_string).or(Some(organizer_property.value.clone()));

        let index = arena.entry(&canonical);
        let participant = &mut arena.participants[index];
        if !participant.roles.contains(&Role::Owner) {
            participant.roles.push(Role::Owner);
        }
        if let Some(name) = organizer_property.param("CN") {
            participant.name = Some(name.to_string());
        }
    }

    for attendee_property in attendees {
        let canonical = canonicalize_email(&attendee_property.value);
        let index = arena.entry(&canonical);

        path_stack.scoped(format!("participants[{canonical:?}]"), |stack| {
            let participant = &mut arena.participants[index];

            if !participant.roles.contains(&Role::Attendee) {
                participant.roles.push(Role::Attendee);
            }

            if let Some(role) = attendee_property.param("ROLE") {
                match role {
                    "CHAIR" => {
                        if !participant.roles.contains(&Role::Chair) {
                            participant.roles.push(Role::Chair);
                        }
                    }
                    "REQ-PARTICIPANT" | "" => {
                        participant.schedule_priority = Some(SchedulePriority::Required);
                    }
                    "OPT-PARTICIPANT" => {
                        participant.schedule_priority = Some(SchedulePriority::Optional);
                    }
                    "NON-PARTICIPANT" => {
                        participant.schedule_priority = Some(SchedulePriority::NonParticipant);
                    }
                    other => {
                        stack.record(format!("unrecognized ROLE parameter {other:?}"));
                    }
                }
            }

            if let Some(cn) = attendee_property.param("CN") {
                participant.name = Some(cn.to_string());
            }

            if let Some(cutype) = attendee_property.param("CUTYPE") {
                participant.kind = Some(match cutype {
                    "INDIVIDUAL" => ParticipantKind::Individual,
                    "GROUP" => ParticipantKind::Group,
                    "RESOURCE" => ParticipantKind::Resource,
                    "ROOM" => ParticipantKind::Location,
                    _ => ParticipantKind::Unknown,
                });
            }

            if let Some(rsvp) = attendee_property.param("RSVP") {
                participant.schedule_rsvp = Some(rsvp.eq_ignore_ascii_case("TRUE"));
            }

            if let Some(updated) = attendee_property.param("X-DTSTART") {
                match UtcDateTime::parse(updated) {
                    Ok(parsed) => participant.schedule_updated = Some(parsed.format()),
                    Err(_) => stack.record("invalid X-DTSTART scheduleUpdated timestamp"),
                }
            }

            match attendee_property.param("PARTSTAT") {
                Some("NEEDS-ACTION") | None => participant.schedule_status = Some(ScheduleStatus::NeedsAction),
                Some("ACCEPTED") => participant.schedule_status = Some(ScheduleStatus::Accepted),
                Some("DECLINED") => participant.schedule_status = Some(ScheduleStatus::Declined),
                Some("TENTATIVE") => participant.schedule_status = Some(ScheduleStatus::Tentative),
                Some("DELEGATED") => {
                    participant.schedule_status = Some(ScheduleStatus::Tentative);
                    participant.delegated_to = attendee_property
                        .param("DELEGATED-TO")
                        .map(canonicalize_email);
                }
                Some(other) => stack.record(format!("unrecognized PARTSTAT {other:?}")),
            }
        });
    }

    // Delegation resolution happens after every attendee has an entry, so
    // forward references (B declared before A delegates to B) still
    // resolve correctly.
    let resolved: Vec<Option<ScheduleStatus>> = (0..arena.participants.len())
        .map(|index| {
            if arena.participants[index].delegated_to.is_some() {
                arena.resolve_schedule_status(index)
            } else {
                arena.participants[index].schedule_status
            }
        })
        .collect();

    for (index, status) in resolved.into_iter().enumerate() {
        arena.participants[index].schedule_status = status;
    }

    (arena.into_ordered_entries(), reply_to)
}

/// Reconstructs a single ORGANIZER property (the owner; the last
/// declared wins on conflict) and one ATTENDEE property per non-owner
/// participant (spec.md §4.4).
pub fn encode_participants(participants: &[(String, Participant)]) -> (Option<Property>, Vec<Property>) {
    let mut organizer = None;
    let mut attendees = Vec::new();

    for (_id, participant) in participants {
        if participant.roles.contains(&Role::Owner) {
            let mut property = Property::new("ORGANIZER", to_cal_address(&participant.email));
            if let Some(name) = &participant.name {
                property.set_param("CN", name.clone());
            }
            organizer = Some(property);
        }

        let owner_only = participant.roles.len() == 1 && participant.roles.contains(&Role::Owner);
        if !owner_only {
            let mut property = Property::new("ATTENDEE", to_cal_address(&participant.email));

            if let Some(name) = &participant.name {
                property.set_param("CN", name.clone());
            }
            if participant.roles.contains(&Role::Chair) {
                property.set_param("ROLE", "CHAIR");
            } else if let Some(priority) = participant.schedule_priority {
                property.set_param(
                    "ROLE",
                    match priority {
                        SchedulePriority::Required => "REQ-PARTICIPANT",
                        SchedulePriority::Optional => "OPT-PARTICIPANT",
                        SchedulePriority::NonParticipant => "NON-PARTICIPANT",
                    },
                );
            }
            if let Some(kind) = participant.kind {
                property.set_param(
                    "CUTYPE",
                    match kind {
                        ParticipantKind::Individual => "INDIVIDUAL",
                        ParticipantKind::Group => "GROUP",
                        ParticipantKind::Resource => "RESOURCE",
                        ParticipantKind::Location => "ROOM",
                        ParticipantKind::Unknown => "UNKNOWN",
                    },
                );
            }
            if let Some(rsvp) = participant.schedule_rsvp {
                property.set_param("RSVP", if rsvp { "TRUE" } else { "FALSE" });
            }
            if let Some(status) = participant.schedule_status {
                property.set_param(
                    "PARTSTAT",
                    match status {
                        ScheduleStatus::NeedsAction => "NEEDS-ACTION",
                        ScheduleStatus::Accepted => "ACCEPTED",
                        ScheduleStatus::Declined => "DECLINED",
                        ScheduleStatus::Tentative => "TENTATIVE",
                    },
                );
            }
            if let Some(updated) = &participant.schedule_updated {
                property.set_param("X-DTSTART", updated.clone());
            }

            attendees.push(property);
        }
    }

    (organizer, attendees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_and_merges_organizer_and_attendee() {
        let organizer = Property::new("ORGANIZER", "mailto:Jane@Example.com");
        let attendee = Property::new("ATTENDEE", "mailto:jane@example.com");
        let attendees = vec![&attendee];
        let mut path_stack = PathStack::new();

        let (participants, reply_to) = build_participants(Some(&organizer), &attendees, &mut path_stack);

        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].0, "jane@example.com");
        assert!(participants[0].1.roles.contains(&Role::Owner));
        assert!(participants[0].1.roles.contains(&Role::Attendee));
        assert_eq!(reply_to.as_deref(), Some("mailto:Jane@Example.com"));
    }

    #[test]
    fn delegation_chain_resolves_to_accepted() {
        let organizer = Property::new("ORGANIZER", "mailto:boss@example.com");

        let mut delegator = Property::new("ATTENDEE", "mailto:a@example.com");
        delegator.set_param("PARTSTAT", "DELEGATED");
        delegator.set_param("DELEGATED-TO", "mailto:b@example.com");

        let mut delegate = Property::new("ATTENDEE", "mailto:b@example.com");
        delegate.set_param("PARTSTAT", "ACCEPTED");

        let attendees = vec![&delegator, &delegate];
        let mut path_stack = PathStack::new();

        let (participants, _reply_to) = build_participants(Some(&organizer), &attendees, &mut path_stack);

        let a = participants.iter().find(|(id, _)| id == "a@example.com").unwrap();
        assert_eq!(a.1.schedule_status, Some(ScheduleStatus::Accepted));
    }

    #[test]
    fn delegation_loop_falls_back_to_needs_action() {
        let mut a = Property::new("ATTENDEE", "mailto:a@example.com");
        a.set_param("PARTSTAT", "DELEGATED");
        a.set_param("DELEGATED-TO", "mailto:b@example.com");

        let mut b = Property::new("ATTENDEE", "mailto:b@example.com");
        b.set_param("PARTSTAT", "DELEGATED");
        b.set_param("DELEGATED-TO", "mailto:a@example.com");

        let attendees = vec![&a, &b];
        let mut path_stack = PathStack::new();

        let (participants, _) = build_participants(None, &attendees, &mut path_stack);

        for (_, participant) in &participants {
            assert_eq!(participant.schedule_status, Some(ScheduleStatus::NeedsAction));
        }
    }
}
