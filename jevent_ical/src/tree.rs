//! The narrow tree representation this crate's callers exchange with us.
//!
//! `spec.md` scopes the raw byte-level ICAL tokenizer/printer out of this
//! system: encode/decode operate on an already-unfolded tree of components
//! and properties, not on a stream of CRLF-terminated lines. `Component`
//! and `Property` are that tree. Producing/consuming actual `.ics` bytes
//! from/to this tree is the caller's concern.

use std::collections::BTreeMap;

/// One `NAME;PARAM=VALUE;...:VALUE` content line, already split into its
/// name, parameters and raw value text (still ICAL-TEXT-escaped where the
/// underlying property is of type TEXT; the value-level codecs in
/// `crate::values` are responsible for un-escaping).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// First parameter value matching `key`, case-insensitively.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(existing) = self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            existing.1 = value.into();
        } else {
            self.params.push((key, value.into()));
        }
    }

    pub fn remove_param(&mut self, key: &str) {
        self.params.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }
}

/// A component of the tree (`VCALENDAR`, `VEVENT`, `VALARM`, `VTIMEZONE`,
/// `STANDARD`/`DAYLIGHT`). Properties are kept in insertion order so that
/// encoders can rely on §5's ordering guarantees; nested components
/// (alarms inside an event, standard/daylight inside a timezone) live in
/// `components`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn push_property(&mut self, property: Property) -> &mut Self {
        self.properties.push(property);
        self
    }

    pub fn push_component(&mut self, component: Component) -> &mut Self {
        self.components.push(component);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> {
        self.properties.iter().filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn remove_properties_named(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    pub fn components_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> {
        self.components.iter().filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn remove_components_named(&mut self, name: &str) {
        self.components.retain(|c| !c.name.eq_ignore_ascii_case(name));
    }
}

/// The root of the tree handed across the public interface: a `VCALENDAR`
/// holding zero or more `VEVENT`/`VTIMEZONE` children.
pub type Ical = Component;

/// Groups a master event component apart from its recurrence-exception
/// siblings and the calendar's VTIMEZONE blocks, the shape every codec in
/// `jevent_core` actually wants to work against.
pub struct EventTree<'a> {
    pub master: &'a Component,
    pub exceptions: Vec<&'a Component>,
    pub timezones: BTreeMap<String, &'a Component>,
}

impl<'a> EventTree<'a> {
    pub fn split(calendar: &'a Ical) -> Option<Self> {
        let mut events: Vec<&Component> = calendar.components_named("VEVENT").collect();
        if events.is_empty() {
            return None;
        }

        let master_idx = events.iter().position(|e| e.property("RECURRENCE-ID").is_none())?;
        let master = events.remove(master_idx);

        let mut timezones = BTreeMap::new();
        for tz in calendar.components_named("VTIMEZONE") {
            if let Some(tzid) = tz.property("TZID") {
                timezones.insert(tzid.value.clone(), tz);
            }
        }

        Some(Self {
            master,
            exceptions: events,
            timezones,
        })
    }
}
