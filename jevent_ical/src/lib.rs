//! Typed ICAL value codecs and the component tree they operate on.
//!
//! This crate deliberately stops short of being a full RFC 5545
//! tokenizer/printer: `spec.md` scopes that piece out as an external
//! collaborator referenced through a narrow interface (see
//! `tree::Component`/`tree::Property`). What lives here is the set of
//! *typed value* data types - RECUR, DATE-TIME, DURATION, TEXT, GEO,
//! CAL-ADDRESS - that the translator in `jevent_core` actually needs to
//! get right, each with a `parse`/`format` pair mirroring the grammar
//! RFC 5545 defines for it.

pub mod error;
pub mod tree;
pub mod values;

pub use error::{ValueError, ValueResult};
pub use tree::{Component, EventTree, Ical, Property};
