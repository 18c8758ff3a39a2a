//! LocationCodec (spec.md §4.5): emits/parses structured locations,
//! including the ALTREP JSON sidecar and the end-timezone binding a
//! `rel: "end"` location drives.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use jevent_ical::tree::{Component, Property};
use jevent_ical::values::geo::Geo;

use crate::error::PathStack;

const SIDECAR_PREFIX: &str = "data:application/json;x-jmap-type=location;base64,";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.locality.is_none()
            && self.region.is_none()
            && self.postcode.is_none()
            && self.country.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(rename = "accessInstruction", skip_serializing_if = "Option::is_none")]
    pub access_instruction: Option<String>,
}

impl Location {
    /// spec.md §3: a location must carry at least one field.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.rel.is_none()
            && self.time_zone.is_none()
            && self.coordinates.is_none()
            && self.uri.is_none()
            && self.address.as_ref().map(Address::is_empty).unwrap_or(true)
            && self.access_instruction.is_none()
    }

    /// True when the location carries more than a bare `name` - the
    /// threshold spec.md §4.5 uses to decide whether the ALTREP sidecar
    /// is worth attaching.
    fn has_structured_fields(&self) -> bool {
        self.rel.is_some()
            || self.time_zone.is_some()
            || self.coordinates.is_some()
            || self.uri.is_some()
            || self.address.as_ref().map(|address| !address.is_empty()).unwrap_or(false)
            || self.access_instruction.is_some()
    }
}

/// `<sha1-hex-of-line>-auto` (spec.md §4.5): synthesized when a decoded
/// `X-LOCATION` carries no `X-JMAP-ID`. There is no raw content line at
/// this layer (the byte-level tokenizer is out of scope - see
/// `jevent_ical`'s crate docs), so the hash is taken over the property's
/// canonical name/value/params instead of its original bytes.
fn derive_auto_id(property: &Property) -> String {
    let mut hasher = Sha1::new();
    hasher.update(property.name.as_bytes());
    hasher.update(b":");
    hasher.update(property.value.as_bytes());
    for (key, value) in &property.params {
        hasher.update(b";");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}-auto", hasher.finalize())
}

fn decode_sidecar(altrep: &str) -> Option<Location> {
    let encoded = altrep.strip_prefix(SIDECAR_PREFIX)?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn encode_sidecar(location: &Location) -> Option<String> {
    let json = serde_json::to_vec(location).ok()?;
    Some(format!("{SIDECAR_PREFIX}{}", base64::engine::general_purpose::STANDARD.encode(json)))
}

/// Decodes every `X-LOCATION` property on `component` into ordered
/// `(id, Location)` pairs, preferring the ALTREP sidecar over the bare
/// name when present (spec.md §4.5). A standalone `GEO` property mirrors
/// onto the first (primary) location's `coordinates` when that location
/// doesn't already carry its own via the sidecar.
pub fn decode_locations(component: &Component, _path_stack: &mut PathStack) -> Vec<(String, Location)> {
    let mut locations = Vec::new();

    for property in component.properties_named("X-LOCATION") {
        let id = property
            .param("X-JMAP-ID")
            .map(str::to_string)
            .unwrap_or_else(|| derive_auto_id(property));

        let mut location = property.param("ALTREP").and_then(decode_sidecar).unwrap_or_default();

        if location.name.is_none() {
            location.name = Some(if property.value == "_" {
                String::new()
            } else {
                jevent_ical::values::text::unescape(&property.value)
            });
        }

        if location.rel.is_none() {
            location.rel = property.param("X-JMAP-REL").map(str::to_string);
        }

        locations.push((id, location));
    }

    if let Some(geo_property) = component.property("GEO") {
        if let Ok(geo) = Geo::parse(&geo_property.value) {
            if let Some((_, first)) = locations.first_mut() {
                first.coordinates.get_or_insert_with(|| geo.format_uri());
            }
        }
    }

    locations
}

/// Resolves the end-timezone binding a `rel: "end"` location drives
/// (spec.md §4.5), preferring a location whose id matches `end_id`
/// (cross-referenced from `DTEND`'s `X-JMAP-ID`, see `codec.rs`) and
/// falling back to the first location tagged `rel: "end"`.
pub fn end_time_zone<'a>(locations: &'a [(String, Location)], end_id: Option<&str>) -> Option<&'a str> {
    if let Some(end_id) = end_id {
        if let Some((_, location)) = locations.iter().find(|(id, _)| id == end_id) {
            if let Some(tz) = &location.time_zone {
                return Some(tz.as_str());
            }
        }
    }

    locations
        .iter()
        .find(|(_, location)| location.rel.as_deref() == Some("end"))
        .and_then(|(_, location)| location.time_zone.as_deref())
}

/// Id of the location that should drive the end-timezone binding, if any
/// - the value `codec.rs` attaches as `DTEND`'s `X-JMAP-ID` param.
pub fn end_location_id(locations: &[(String, Location)]) -> Option<&str> {
    locations
        .iter()
        .find(|(_, location)| location.rel.as_deref() == Some("end"))
        .map(|(id, _)| id.as_str())
}

/// Encodes the ordered location map back into `X-LOCATION` properties,
/// attaching the ALTREP JSON sidecar whenever a location carries more
/// than a bare name, and mirroring the primary (first) location's
/// coordinates as a `GEO` property.
pub fn encode_locations(locations: &[(String, Location)]) -> Vec<Property> {
    let mut properties = Vec::new();

    for (index, (id, location)) in locations.iter().enumerate() {
        if index == 0 {
            if let Some(coordinates) = &location.coordinates {
                if let Ok(geo) = Geo::parse(coordinates) {
                    properties.push(Property::new("GEO", geo.format_property()));
                }
            }
        }

        let value = match location.name.as_deref() {
            Some(name) if !name.is_empty() => jevent_ical::values::text::escape(name),
            _ => "_".to_string(),
        };

        let mut property = Property::new("X-LOCATION", value);
        property.set_param("X-JMAP-ID", id.clone());

        if let Some(rel) = &location.rel {
            property.set_param("X-JMAP-REL", rel.clone());
        }

        if location.has_structured_fields() {
            if let Some(sidecar) = encode_sidecar(location) {
                property.set_param("ALTREP", sidecar);
            }
        }

        properties.push(property);
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_location_round_trips_through_name_only() {
        let locations = vec![(
            "loc1".to_string(),
            Location {
                name: Some("Cafe".to_string()),
                ..Default::default()
            },
        )];

        let properties = encode_locations(&locations);
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].value, "Cafe");
        assert!(properties[0].param("ALTREP").is_none());

        let mut component = Component::new("VEVENT");
        for property in properties {
            component.push_property(property);
        }
        let mut path_stack = PathStack::new();
        let decoded = decode_locations(&component, &mut path_stack);
        assert_eq!(decoded, locations);
    }

    #[test]
    fn structured_location_round_trips_via_altrep_sidecar() {
        let locations = vec![(
            "loc1".to_string(),
            Location {
                name: Some("HQ".to_string()),
                coordinates: Some("geo:37.386013,-122.082932".to_string()),
                address: Some(Address {
                    locality: Some("Mountain View".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )];

        let properties = encode_locations(&locations);
        assert!(properties.iter().any(|p| p.name == "GEO"));
        let location_property = properties.iter().find(|p| p.name == "X-LOCATION").unwrap();
        assert!(location_property.param("ALTREP").is_some());

        let mut component = Component::new("VEVENT");
        for property in properties {
            component.push_property(property);
        }
        let mut path_stack = PathStack::new();
        let decoded = decode_locations(&component, &mut path_stack);
        assert_eq!(decoded, locations);
    }

    #[test]
    fn empty_name_encodes_as_underscore_placeholder() {
        let locations = vec![(
            "loc1".to_string(),
            Location {
                coordinates: Some("geo:1,2".to_string()),
                ..Default::default()
            },
        )];
        let properties = encode_locations(&locations);
        let location_property = properties.iter().find(|p| p.name == "X-LOCATION").unwrap();
        assert_eq!(location_property.value, "_");
    }

    #[test]
    fn derives_auto_id_when_x_jmap_id_absent() {
        let mut component = Component::new("VEVENT");
        component.push_property(Property::new("X-LOCATION", "Cafe"));
        let mut path_stack = PathStack::new();
        let decoded = decode_locations(&component, &mut path_stack);
        assert!(decoded[0].0.ends_with("-auto"));
    }
}
