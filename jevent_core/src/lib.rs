//! Bidirectional translator between ICAL (RFC 5545, handed to us as an
//! already-parsed component tree, see [`jevent_ical`]) and JEVENT, a JSON
//! representation of the same calendar event (`spec.md` §1).
//!
//! The public surface is deliberately small: [`encode`]/[`decode`] plus the
//! [`Options`] callback and the [`Error`] taxonomy. Everything else in this
//! crate is a component codec `codec::encode`/`codec::decode` wires
//! together - recurrence, participants, locations, alerts, translations and
//! recurrence overrides each get their own module, the same one-codec-per-
//! concern shape the teacher's `redical_ical::properties` uses.

pub mod alert;
pub mod codec;
pub mod error;
pub mod location;
pub mod options;
pub mod override_codec;
pub mod participant;
pub mod recurrence;
pub mod scalars;
pub mod time;
pub mod translation;
pub mod tz_registry;

pub use codec::{decode, encode};
pub use error::{Error, PathStack, PropertyError, Result};
pub use options::Options;

pub use jevent_ical::{Component, EventTree, Ical, Property};
