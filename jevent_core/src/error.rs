//! Error taxonomy (spec.md §6/§7).
//!
//! Structural errors (`MissingUid`, `InvalidIcal`, `Unknown`, `Callback`,
//! `Memory`) abort a pass immediately. Field-level errors accumulate under
//! a path stack (see `PathStack`) and surface together as a single
//! `PropertyErrors` once a pass completes - callers never see a partially
//! populated result.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("callback error: {0}")]
    Callback(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("invalid ical: {0}")]
    InvalidIcal(String),

    #[error("{} invalid field(s)", .0.len())]
    PropertyErrors(Vec<PropertyError>),

    #[error("missing uid")]
    MissingUid,
}

impl Error {
    pub fn invalid_ical(message: impl Into<String>) -> Self {
        Self::InvalidIcal(message.into())
    }
}

/// Accumulates field-level errors under a path stack maintained by the
/// orchestrator (spec.md §7). Each component pushes a segment (a field
/// name, array index, or map key) via `scope`/`scoped` and pops on exit;
/// `into_result` turns a nonempty accumulator into `Error::PropertyErrors`.
#[derive(Debug, Default)]
pub struct PathStack {
    segments: Vec<String>,
    errors: Vec<PropertyError>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_path(&self) -> String {
        self.segments.join("")
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    /// Runs `body` with `segment` pushed onto the path, popping it
    /// regardless of whether `body` recorded an error.
    pub fn scoped<T>(&mut self, segment: impl Into<String>, body: impl FnOnce(&mut Self) -> T) -> T {
        self.push(segment);
        let result = body(self);
        self.pop();
        result
    }

    pub fn record(&mut self, message: impl Into<String>) {
        self.errors.push(PropertyError {
            path: self.current_path(),
            message: message.into(),
        });
    }

    pub fn record_at(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(PropertyError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::PropertyErrors(self.errors))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
