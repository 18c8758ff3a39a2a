use std::fmt;

/// A malformed value string for one of the typed ICAL value data types
/// (`RECUR`, `DATE-TIME`, `DURATION`, `TEXT`, `GEO`, `CAL-ADDRESS`, ...).
///
/// This is distinct from `jevent_core::Error` - it carries no field path,
/// only the offending value and a human message, because the value codecs
/// in this crate are not aware of where in an event they are being used.
/// `jevent_core` wraps these into `Error::InvalidField` at a known path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub value: String,
    pub message: String,
}

impl ValueError {
    pub fn new(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.message, self.value)
    }
}

impl std::error::Error for ValueError {}

pub type ValueResult<T> = Result<T, ValueError>;
