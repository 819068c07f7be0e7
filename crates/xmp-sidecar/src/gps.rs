//! GPS region of a sidecar
//!
//! Positions are written as `exif:GPS*` attributes on the primary description
//! using the XMP "degrees,decimal-minutes + hemisphere" notation. Existing GPS
//! data is recognised both as attributes and as child elements, and both forms
//! are removed before a rewrite so the region is always replaced as one unit.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use track_index::Coordinate;

use crate::document::{Region, SidecarDocument, SidecarError};

pub const EXIF_NAMESPACE: &str = "http://ns.adobe.com/exif/1.0/";
pub const GPS_VERSION_ID: &str = "2.3.0.0";

const GPS_FIELDS: [&str; 9] = [
    "GPSLatitude",
    "GPSLatitudeRef",
    "GPSLongitude",
    "GPSLongitudeRef",
    "GPSAltitude",
    "GPSAltitudeRef",
    "GPSVersionID",
    "GPSDateStamp",
    "GPSTimeStamp",
];

/// Fields whose presence means the sidecar already carries a position
const POSITIONAL_FIELDS: [&str; 5] = [
    "GPSLatitude",
    "GPSLongitude",
    "GPSAltitude",
    "GPSDateStamp",
    "GPSTimeStamp",
];

static GPS_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)\s+exif:GPS(?:Latitude|LatitudeRef|Longitude|LongitudeRef|Altitude|AltitudeRef|VersionID|DateStamp|TimeStamp)\s*=\s*("[^"]*"|'[^']*')"#,
    )
    .expect("gps attribute regex")
});

struct FieldPatterns {
    attribute: Regex,
    /// Element form, including the line break and indent in front of it
    element: Regex,
}

static FIELD_PATTERNS: Lazy<HashMap<&'static str, FieldPatterns>> = Lazy::new(|| {
    GPS_FIELDS
        .iter()
        .map(|name| {
            let patterns = FieldPatterns {
                attribute: Regex::new(&format!(r#"(?is)\bexif:{name}\s*=\s*(?:"([^"]*)"|'([^']*)')"#))
                    .expect("gps field attribute regex"),
                element: Regex::new(&format!(
                    r"(?is)(?:\r?\n[ \t]*)?<exif:{name}(?:\s[^>]*)?>(.*?)</exif:{name}\s*>"
                ))
                .expect("gps field element regex"),
            };
            (*name, patterns)
        })
        .collect()
});

/// Position read back from a sidecar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsReading {
    pub coordinate: Coordinate,
    /// UTC date + time stamp, second resolution
    pub timestamp: Option<DateTime<Utc>>,
}

impl SidecarDocument {
    /// Whether any positional GPS field is present, in either form.
    pub fn has_gps(&self) -> bool {
        POSITIONAL_FIELDS.iter().any(|name| {
            FIELD_PATTERNS
                .get(name)
                .map_or(false, |p| p.attribute.is_match(self.as_str()) || p.element.is_match(self.as_str()))
        })
    }

    /// Decode the stored position. `None` without both latitude and longitude.
    pub fn gps(&self) -> Option<GpsReading> {
        let latitude = parse_gps_coordinate(&self.gps_field("GPSLatitude")?)?;
        let longitude = parse_gps_coordinate(&self.gps_field("GPSLongitude")?)?;

        let altitude = self.gps_field("GPSAltitude").and_then(|raw| parse_number(&raw)).map(|alt| {
            match self.gps_field("GPSAltitudeRef").as_deref().map(str::trim) {
                Some("1") => -alt.abs(),
                _ => alt,
            }
        });

        let timestamp = self.gps_timestamp();

        Some(GpsReading {
            coordinate: Coordinate::new(latitude, longitude, altitude),
            timestamp,
        })
    }

    /// Write all GPS fields for `coord` at `timestamp`.
    ///
    /// Fails with `AlreadyPresent` when a position exists and `overwrite` is
    /// off; the document is left untouched in that case.
    pub fn update_gps(
        &mut self,
        coord: &Coordinate,
        timestamp: DateTime<Utc>,
        overwrite: bool,
    ) -> Result<(), SidecarError> {
        if !overwrite && self.has_gps() {
            return Err(SidecarError::AlreadyPresent(Region::Gps));
        }
        self.primary_description()?;

        self.strip_gps();
        self.ensure_namespace("exif", EXIF_NAMESPACE)?;
        let attrs: Vec<String> = gps_attributes(coord, timestamp)
            .into_iter()
            .map(|(name, value)| format!("exif:{name}=\"{value}\""))
            .collect();
        self.insert_description_attributes(&attrs)
    }

    fn gps_field(&self, name: &str) -> Option<String> {
        let patterns = FIELD_PATTERNS.get(name)?;
        if let Some(caps) = patterns.attribute.captures(self.as_str()) {
            return caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().trim().to_string());
        }
        patterns
            .element
            .captures(self.as_str())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    fn gps_timestamp(&self) -> Option<DateTime<Utc>> {
        let time = self.gps_field("GPSTimeStamp")?;
        // Some writers store a full ISO 8601 instant in GPSTimeStamp
        if let Ok(instant) = DateTime::parse_from_rfc3339(&time) {
            return Some(instant.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(&self.gps_field("GPSDateStamp")?, "%Y:%m:%d").ok()?;
        let time = NaiveTime::parse_from_str(&time, "%H:%M:%S%.f").ok()?;
        Some(DateTime::from_naive_utc_and_offset(date.and_time(time), Utc))
    }

    /// Remove every GPS attribute and element, wherever it sits.
    fn strip_gps(&mut self) {
        let mut text = GPS_ATTRIBUTE.replace_all(self.as_str(), "").into_owned();
        for name in GPS_FIELDS {
            if let Some(patterns) = FIELD_PATTERNS.get(name) {
                text = patterns.element.replace_all(&text, "").into_owned();
            }
        }
        *self.text_mut() = text;
    }
}

/// Field name / value pairs in write order.
pub fn gps_attributes(coord: &Coordinate, timestamp: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let (latitude, latitude_ref) = format_gps_coordinate(coord.latitude, 'N', 'S');
    let (longitude, longitude_ref) = format_gps_coordinate(coord.longitude, 'E', 'W');

    let mut attrs = vec![
        ("GPSLatitude", latitude),
        ("GPSLatitudeRef", latitude_ref.to_string()),
        ("GPSLongitude", longitude),
        ("GPSLongitudeRef", longitude_ref.to_string()),
    ];
    if let Some(altitude) = coord.altitude {
        let altitude_ref = if altitude < 0.0 { 1 } else { 0 };
        attrs.push(("GPSAltitude", format!("{:.2}", altitude.abs())));
        attrs.push(("GPSAltitudeRef", altitude_ref.to_string()));
    }
    attrs.push(("GPSVersionID", GPS_VERSION_ID.to_string()));
    attrs.push(("GPSDateStamp", timestamp.format("%Y:%m:%d").to_string()));
    attrs.push(("GPSTimeStamp", timestamp.format("%H:%M:%S").to_string()));
    attrs
}

/// Encode signed degrees as `D,M.mmmR`, e.g. `52,31.2R`.
///
/// Minutes are rounded to 10 decimals before trailing zeros are trimmed, so
/// floating point noise never leaks into the sidecar.
pub fn format_gps_coordinate(value: f64, positive: char, negative: char) -> (String, char) {
    let reference = if value < 0.0 { negative } else { positive };

    let abs = value.abs();
    let mut degrees = abs.floor();
    let mut minutes = ((abs - degrees) * 60.0 * 1e10).round() / 1e10;
    if minutes >= 60.0 {
        degrees += 1.0;
        minutes = 0.0;
    }

    let formatted = format!("{minutes:.10}");
    let mut minutes_str = formatted.trim_end_matches('0').trim_end_matches('.');
    if minutes_str.is_empty() {
        minutes_str = "0";
    }

    (format!("{degrees:.0},{minutes_str}{reference}"), reference)
}

/// Decode `D,M.mR`, `D,M,SR` or plain signed degrees.
pub fn parse_gps_coordinate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (body, negative) = match raw.chars().last()? {
        'N' | 'n' | 'E' | 'e' => (&raw[..raw.len() - 1], false),
        'S' | 's' | 'W' | 'w' => (&raw[..raw.len() - 1], true),
        _ => (raw, false),
    };

    let parts: Vec<f64> = body
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    let magnitude = match parts.as_slice() {
        [deg] => *deg,
        [deg, min] => deg.abs() + min / 60.0,
        [deg, min, sec] => deg.abs() + min / 60.0 + sec / 3600.0,
        _ => return None,
    };
    let signed_input = parts.first().map_or(false, |d| d.is_sign_negative());

    Some(if negative || (signed_input && parts.len() > 1) {
        -magnitude.abs()
    } else {
        magnitude
    })
}

/// Decimal or `num/den` rational.
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.trim().parse::<f64>().ok()? / den)
        }
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 1).unwrap() + chrono::TimeDelta::milliseconds(750)
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_gps_coordinate(52.5, 'N', 'S'), ("52,30N".to_string(), 'N'));
        assert_eq!(format_gps_coordinate(-13.25, 'E', 'W'), ("13,15W".to_string(), 'W'));
        assert_eq!(format_gps_coordinate(0.0, 'N', 'S'), ("0,0N".to_string(), 'N'));
        // Rounding carries into the next degree
        assert_eq!(format_gps_coordinate(10.999_999_999_999_9, 'N', 'S').0, "11,0N");
        assert_eq!(format_gps_coordinate(48.858_37, 'N', 'S').0, "48,51.5022N");
    }

    #[test]
    fn test_parse_coordinate_forms() {
        assert_eq!(parse_gps_coordinate("52,30N"), Some(52.5));
        assert_eq!(parse_gps_coordinate("13,15W"), Some(-13.25));
        assert_eq!(parse_gps_coordinate("13,15,36S"), Some(-(13.0 + 15.0 / 60.0 + 36.0 / 3600.0)));
        assert_eq!(parse_gps_coordinate("-33.5"), Some(-33.5));
        assert_eq!(parse_gps_coordinate("north"), None);
        assert_eq!(parse_gps_coordinate(""), None);
    }

    #[test]
    fn test_round_trip_on_empty_document() {
        let mut doc = SidecarDocument::new();
        let coord = Coordinate::new(48.858_370_123, -2.294_481_456, Some(-12.5));
        doc.update_gps(&coord, ts(), false).unwrap();

        let reading = doc.gps().unwrap();
        assert!((reading.coordinate.latitude - coord.latitude).abs() < 1e-5);
        assert!((reading.coordinate.longitude - coord.longitude).abs() < 1e-5);
        assert_eq!(reading.coordinate.altitude, Some(-12.5));
        assert_eq!(reading.timestamp, Some(ts().with_nanosecond(0).unwrap()));

        assert!(doc.as_str().contains("xmlns:exif=\"http://ns.adobe.com/exif/1.0/\""));
        assert!(doc.as_str().contains("exif:GPSAltitudeRef=\"1\""));
        assert!(doc.as_str().contains("exif:GPSVersionID=\"2.3.0.0\""));
        assert!(doc.as_str().contains("exif:GPSDateStamp=\"2024:05:01\" exif:GPSTimeStamp=\"10:00:01\""));
    }

    #[test]
    fn test_existing_gps_requires_overwrite() {
        let mut doc = SidecarDocument::new();
        doc.update_gps(&Coordinate::new(1.0, 2.0, None), ts(), false).unwrap();
        let before = doc.clone();

        let err = doc.update_gps(&Coordinate::new(3.0, 4.0, None), ts(), false).unwrap_err();
        assert!(matches!(err, SidecarError::AlreadyPresent(Region::Gps)));
        assert_eq!(doc, before);

        doc.update_gps(&Coordinate::new(3.0, 4.0, None), ts(), true).unwrap();
        assert_eq!(doc.gps().unwrap().coordinate.latitude, 3.0);
        assert_eq!(doc.as_str().matches("exif:GPSLatitude=").count(), 1);
        assert_eq!(doc.as_str().matches("xmlns:exif=").count(), 1);
    }

    #[test]
    fn test_overwrite_with_same_position_is_stable() {
        let mut doc = SidecarDocument::new();
        let coord = Coordinate::new(47.1, 8.2, Some(400.0));
        doc.update_gps(&coord, ts(), false).unwrap();
        let first = doc.clone();
        doc.update_gps(&coord, ts(), true).unwrap();
        assert_eq!(doc, first);
    }

    #[test]
    fn test_unrelated_content_is_preserved() {
        let original = concat!(
            "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n",
            " <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
            "  <rdf:Description rdf:about=\"\"\n",
            "    xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n",
            "    xmlns:custom=\"urn:example:custom\"\n",
            "    xmp:Rating=\"4\"\n",
            "    custom:Note='keep &amp; me'>\n",
            "   <custom:Notes>\n",
            "    <rdf:Seq><rdf:li>first</rdf:li></rdf:Seq>\n",
            "   </custom:Notes>\n",
            "  </rdf:Description>\n",
            " </rdf:RDF>\n",
            "</x:xmpmeta>\n",
        );
        let mut doc = SidecarDocument::parse(original.as_bytes()).unwrap();
        doc.update_gps(&Coordinate::new(10.0, 20.0, None), ts(), false).unwrap();
        let out = doc.as_str();

        // Everything after the start tag is byte-identical
        let body_start = original.find("\n   <custom:Notes>").unwrap();
        assert!(out.ends_with(&original[body_start..]));
        assert!(out.starts_with(&original[..original.find("'keep &amp; me'").unwrap()]));
        assert!(out.contains("custom:Note='keep &amp; me'\n    xmlns:exif=\"http://ns.adobe.com/exif/1.0/\"\n    exif:GPSLatitude=\"10,0N\""));
    }

    #[test]
    fn test_element_form_gps_is_replaced() {
        let original = concat!(
            "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n",
            "  <rdf:Description rdf:about=\"\" xmlns:exif=\"http://ns.adobe.com/exif/1.0/\">\n",
            "    <exif:GPSLatitude>50,4.5N</exif:GPSLatitude>\n",
            "    <exif:GPSLongitude>14,25.5E</exif:GPSLongitude>\n",
            "    <exif:GPSTimeStamp>2023-09-01T08:30:00Z</exif:GPSTimeStamp>\n",
            "    <exif:ExposureTime>1/250</exif:ExposureTime>\n",
            "  </rdf:Description>\n",
            "</rdf:RDF>",
        );
        let mut doc = SidecarDocument::parse(original.as_bytes()).unwrap();
        assert!(doc.has_gps());
        let reading = doc.gps().unwrap();
        assert!((reading.coordinate.latitude - 50.075).abs() < 1e-9);
        assert_eq!(reading.timestamp, Some(Utc.with_ymd_and_hms(2023, 9, 1, 8, 30, 0).unwrap()));

        doc.update_gps(&Coordinate::new(1.5, 2.5, None), ts(), true).unwrap();
        let out = doc.as_str();
        assert!(!out.contains("<exif:GPSLatitude>"));
        assert!(!out.contains("<exif:GPSTimeStamp>"));
        assert!(out.contains("\n    <exif:ExposureTime>1/250</exif:ExposureTime>\n  </rdf:Description>"));
        assert_eq!(out.matches("xmlns:exif=").count(), 1);
        assert_eq!(doc.gps().unwrap().coordinate.latitude, 1.5);
    }

    #[test]
    fn test_altitude_rational() {
        assert_eq!(parse_number("12345/100"), Some(123.45));
        assert_eq!(parse_number("1/0"), None);
    }
}
