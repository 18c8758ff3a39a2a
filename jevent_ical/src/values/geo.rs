//! GEO value data type (RFC 5545 §3.8.1.6) and the `geo:` URI scheme
//! (RFC 5870) used as its JSON mirror.
//!
//! Open question from spec.md §9: the historical GEO emitter writes
//! semicolon-separated decimals while `geo:` URIs use commas. We accept
//! both separators on parse and always emit the comma form for JSON.

use crate::error::{ValueError, ValueResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geo {
    pub latitude: f64,
    pub longitude: f64,
}

impl Geo {
    /// Accepts either `lat;lon` (the GEO property's own grammar) or
    /// `lat,lon` (the `geo:` URI's) so that both historical emitters this
    /// system has to interoperate with are understood.
    pub fn parse(value: &str) -> ValueResult<Self> {
        let value = value.strip_prefix("geo:").unwrap_or(value);

        let separator = if value.contains(';') { ';' } else { ',' };
        let mut parts = value.splitn(3, separator);

        let latitude = parts
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| ValueError::new(value, "invalid GEO latitude"))?;

        let longitude = parts
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| ValueError::new(value, "invalid GEO longitude"))?;

        Ok(Geo { latitude, longitude })
    }

    /// `GEO:` property value form, semicolon-separated.
    pub fn format_property(&self) -> String {
        format!("{};{}", self.latitude, self.longitude)
    }

    /// `geo:` URI form, comma-separated - always the form emitted in JSON
    /// per the open-question resolution above.
    pub fn format_uri(&self) -> String {
        format!("geo:{},{}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_form() {
        let geo = Geo::parse("37.386013;-122.082932").unwrap();
        assert_eq!(geo.latitude, 37.386013);
        assert_eq!(geo.longitude, -122.082932);
    }

    #[test]
    fn parses_geo_uri_comma_form() {
        let geo = Geo::parse("geo:37.386013,-122.082932").unwrap();
        assert_eq!(geo.format_uri(), "geo:37.386013,-122.082932");
    }
}
