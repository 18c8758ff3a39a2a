//! The only configuration surface this crate exposes (spec.md §6): a
//! single `is_you` callback used to mark the viewing participant. It
//! affects no persisted bytes, so there is nothing else to configure -
//! the codec otherwise runs identically for every caller.

pub struct Options<'a> {
    pub is_you: Option<Box<dyn Fn(&str) -> bool + 'a>>,
}

impl<'a> Default for Options<'a> {
    fn default() -> Self {
        Self { is_you: None }
    }
}

impl<'a> Options<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_is_you(mut self, callback: impl Fn(&str) -> bool + 'a) -> Self {
        self.is_you = Some(Box::new(callback));
        self
    }

    pub fn is_you(&self, address: &str) -> bool {
        self.is_you.as_ref().map(|callback| callback(address)).unwrap_or(false)
    }
}
