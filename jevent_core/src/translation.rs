//! TranslationCodec (spec.md §4.7): language-tagged per-field
//! translations, addressed through a small typed field-path parser
//! rather than substring-matching the `X-JMAP-PROP` parameter (spec.md
//! §9's "Stringly-typed parameters" design note).

use serde_json::{Map, Value};

use jevent_ical::tree::{Component, Property};
use jevent_ical::values::text;

use crate::error::PathStack;

/// A parsed `X-JMAP-PROP` value: either a bare top-level field name
/// (`title`, `description`) or a two-segment path addressing a field
/// inside a keyed object map (`locations.name`, `links.title`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub field: String,
    pub nested: Option<String>,
}

impl FieldPath {
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut segments = value.split('.');
        let Some(field) = segments.next().filter(|s| !s.is_empty()) else {
            return Err(format!("empty field path: {value:?}"));
        };

        let nested = match segments.next() {
            Some(nested) if !nested.is_empty() => Some(nested.to_string()),
            Some(_) => return Err(format!("empty nested segment in field path: {value:?}")),
            None => None,
        };

        if segments.next().is_some() {
            return Err(format!("field path has too many segments: {value:?}"));
        }

        Ok(FieldPath { field: field.to_string(), nested })
    }

    pub fn format(&self) -> String {
        match &self.nested {
            Some(nested) => format!("{}.{}", self.field, nested),
            None => self.field.clone(),
        }
    }
}

/// One decoded translation entry, prior to being nested under
/// `translations.<lang>`.
struct Entry {
    language: String,
    path: FieldPath,
    object_id: Option<String>,
    value: String,
}

/// Decodes every `X-JMAP-TRANSLATION` property into the nested JSON
/// shape `translations.<lang>.<path>` (spec.md §4.7), collapsing
/// `locations.name`/`links.title`-style paths into
/// `translations.<lang>.<field>.<object-id>` when an `X-JMAP-ID` is
/// present.
pub fn decode_translations(component: &Component, path_stack: &mut PathStack) -> Option<Value> {
    let mut entries = Vec::new();

    for property in component.properties_named("X-JMAP-TRANSLATION") {
        path_stack.scoped("translations", |stack| {
            let Some(language) = property.param("LANGUAGE") else {
                stack.record("X-JMAP-TRANSLATION missing LANGUAGE parameter");
                return;
            };
            let Some(prop) = property.param("X-JMAP-PROP") else {
                stack.record("X-JMAP-TRANSLATION missing X-JMAP-PROP parameter");
                return;
            };

            match FieldPath::parse(prop) {
                Ok(path) => entries.push(Entry {
                    language: language.to_string(),
                    path,
                    object_id: property.param("X-JMAP-ID").map(str::to_string),
                    value: text::unescape(&property.value),
                }),
                Err(message) => stack.record(message),
            }
        });
    }

    if entries.is_empty() {
        return None;
    }

    let mut by_language: Map<String, Value> = Map::new();

    for entry in entries {
        let language_map = by_language
            .entry(entry.language)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .expect("translation language entries are always objects");

        match (&entry.path.nested, &entry.object_id) {
            (Some(nested), Some(object_id)) => {
                let field_map = language_map
                    .entry(entry.path.field.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .expect("nested translation entries are always objects");
                let object_map = field_map
                    .entry(object_id.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .expect("per-object translation entries are always objects");
                object_map.insert(nested.clone(), Value::String(entry.value));
            }
            _ => {
                language_map.insert(entry.path.format(), Value::String(entry.value));
            }
        }
    }

    Some(Value::Object(by_language))
}

/// Encodes `translations.<lang>.<path>` back into `X-JMAP-TRANSLATION`
/// properties.
pub fn encode_translations(translations: &Value, path_stack: &mut PathStack) -> Vec<Property> {
    let mut properties = Vec::new();

    let Some(languages) = translations.as_object() else {
        path_stack.scoped("translations", |stack| stack.record("translations must be an object keyed by language tag"));
        return properties;
    };

    for (language, fields) in languages {
        let Some(fields) = fields.as_object() else {
            continue;
        };

        for (field, value) in fields {
            match value {
                Value::String(text_value) => {
                    properties.push(make_property(language, field, None, text_value));
                }
                Value::Object(per_object) => {
                    for (object_id, nested) in per_object {
                        let Some(nested) = nested.as_object() else { continue };
                        for (nested_field, text_value) in nested {
                            if let Some(text_value) = text_value.as_str() {
                                let path = FieldPath {
                                    field: field.clone(),
                                    nested: Some(nested_field.clone()),
                                };
                                properties.push(make_property(language, &path.format(), Some(object_id), text_value));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    properties
}

fn make_property(language: &str, path: &str, object_id: Option<&str>, value: &str) -> Property {
    let mut property = Property::new("X-JMAP-TRANSLATION", text::escape(value));
    property.set_param("LANGUAGE", language);
    property.set_param("X-JMAP-PROP", path);
    if let Some(object_id) = object_id {
        property.set_param("X-JMAP-ID", object_id);
    }
    property
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_nested_field_paths() {
        assert_eq!(FieldPath::parse("title").unwrap(), FieldPath { field: "title".to_string(), nested: None });
        assert_eq!(
            FieldPath::parse("locations.name").unwrap(),
            FieldPath { field: "locations".to_string(), nested: Some("name".to_string()) }
        );
        assert!(FieldPath::parse("a.b.c").is_err());
        assert!(FieldPath::parse("").is_err());
    }

    #[test]
    fn decodes_top_level_translation() {
        let mut component = Component::new("VEVENT");
        let mut property = Property::new("X-JMAP-TRANSLATION", "Test");
        property.set_param("LANGUAGE", "de");
        property.set_param("X-JMAP-PROP", "title");
        component.push_property(property);

        let mut path_stack = PathStack::new();
        let decoded = decode_translations(&component, &mut path_stack).unwrap();
        assert_eq!(decoded["de"]["title"], "Test");
    }

    #[test]
    fn decodes_nested_per_object_translation() {
        let mut component = Component::new("VEVENT");
        let mut property = Property::new("X-JMAP-TRANSLATION", "Kaffeehaus");
        property.set_param("LANGUAGE", "de");
        property.set_param("X-JMAP-PROP", "locations.name");
        property.set_param("X-JMAP-ID", "loc1");
        component.push_property(property);

        let mut path_stack = PathStack::new();
        let decoded = decode_translations(&component, &mut path_stack).unwrap();
        assert_eq!(decoded["de"]["locations"]["loc1"]["name"], "Kaffeehaus");
    }

    #[test]
    fn encode_round_trips_nested_translation() {
        let value = serde_json::json!({ "de": { "locations": { "loc1": { "name": "Kaffeehaus" } } } });
        let mut path_stack = PathStack::new();
        let properties = encode_translations(&value, &mut path_stack);
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].value, "Kaffeehaus");
        assert_eq!(properties[0].param("X-JMAP-PROP"), Some("locations.name"));
        assert_eq!(properties[0].param("X-JMAP-ID"), Some("loc1"));
    }
}
