//! LinkCodec / DescriptionCodec / StatusCodec / misc scalars (spec.md
//! §4's "simple fields with validation"): the event-level fields that
//! are a single property each rather than a keyed map or sub-tree.

use serde::{Deserialize, Serialize};

use jevent_ical::tree::{Component, Property};
use jevent_ical::values::text;

use crate::error::PathStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Tentative,
    Confirmed,
    Cancelled,
}

impl Status {
    pub fn parse(value: &str, path_stack: &mut PathStack) -> Option<Self> {
        match value {
            "TENTATIVE" => Some(Status::Tentative),
            "CONFIRMED" => Some(Status::Confirmed),
            "CANCELLED" => Some(Status::Cancelled),
            other => {
                path_stack.scoped("status", |stack| stack.record(format!("unrecognized STATUS {other:?}")));
                None
            }
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            Status::Tentative => "TENTATIVE",
            Status::Confirmed => "CONFIRMED",
            Status::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Link {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
}

/// Decodes every `X-JMAP-LINK` property into ordered `(id, Link)` pairs.
/// There's no standard RFC 5545 property for an arbitrary keyed link
/// list, so this is a bespoke `X-` property in the same family as
/// `X-LOCATION` (spec.md §4.5's sibling codec).
pub fn decode_links(component: &Component, _path_stack: &mut PathStack) -> Vec<(String, Link)> {
    component
        .properties_named("X-JMAP-LINK")
        .enumerate()
        .map(|(index, property)| {
            let id = property.param("X-JMAP-ID").map(str::to_string).unwrap_or_else(|| format!("link-{index}"));
            let link = Link {
                href: Some(property.value.clone()).filter(|v| !v.is_empty()),
                title: property.param("X-JMAP-TITLE").map(str::to_string),
                rel: property.param("X-JMAP-REL").map(str::to_string),
            };
            (id, link)
        })
        .collect()
}

pub fn encode_links(links: &[(String, Link)]) -> Vec<Property> {
    links
        .iter()
        .map(|(id, link)| {
            let mut property = Property::new("X-JMAP-LINK", link.href.clone().unwrap_or_default());
            property.set_param("X-JMAP-ID", id.clone());
            if let Some(title) = &link.title {
                property.set_param("X-JMAP-TITLE", title.clone());
            }
            if let Some(rel) = &link.rel {
                property.set_param("X-JMAP-REL", rel.clone());
            }
            property
        })
        .collect()
}

/// Decodes `RELATED-TO` properties into the `relatedTo` list of uids
/// (spec.md §3). A non-default `RELTYPE` (anything but the implicit
/// `PARENT`) is accepted on decode but not separately modeled - the
/// enrichment SPEC_FULL.md §9 adds is limited to round-tripping a
/// `PARENT` relationship, grounded on the teacher's
/// `properties/event/related_to.rs`/`values/reltype.rs`.
pub fn decode_related_to(component: &Component) -> Vec<String> {
    component.properties_named("RELATED-TO").map(|property| text::unescape(&property.value)).collect()
}

pub fn encode_related_to(related_to: &[String]) -> Vec<Property> {
    related_to
        .iter()
        .map(|uid| {
            let mut property = Property::new("RELATED-TO", text::escape(uid));
            property.set_param("RELTYPE", "PARENT");
            property
        })
        .collect()
}
