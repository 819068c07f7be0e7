//! Per-shot metadata records
//!
//! A [`ShotRecord`] is the fixed subset of photo metadata the series detector
//! and the geotagger need. It is produced once per accepted file by a
//! [`MetadataSource`](crate::exif::MetadataSource) and never mutated afterwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    pub path: PathBuf,
    /// Capture time, sub-second resolution when the camera recorded it
    pub capture_time: DateTime<Utc>,
    pub make: String,
    pub model: String,
    /// Shutter duration in seconds
    pub exposure_time: f64,
    pub f_number: f64,
    pub iso: u32,
    /// Maker note reports HDR=On (merged-output files only)
    pub hdr_hint: bool,
    /// Trailing number of the file stem, `None` when the name has none
    pub sequence: Option<u32>,
}

impl ShotRecord {
    /// Create a record with only the fields every source can provide.
    /// The sequence number is derived from the file name.
    pub fn new(path: PathBuf, capture_time: DateTime<Utc>) -> Self {
        let sequence = parse_sequence(&path);
        Self {
            path,
            capture_time,
            make: String::new(),
            model: String::new(),
            exposure_time: 0.0,
            f_number: 0.0,
            iso: 0,
            hdr_hint: false,
            sequence,
        }
    }

    /// Exposure value normalised to ISO 100.
    ///
    /// Returns `None` when exposure time or aperture is unknown (non-positive).
    pub fn exposure_value(&self) -> Option<f64> {
        if self.exposure_time <= 0.0 || self.f_number <= 0.0 {
            return None;
        }
        let mut ev = ((self.f_number * self.f_number) / self.exposure_time).log2();
        if self.iso > 0 {
            ev -= (self.iso as f64 / 100.0).log2();
        }
        Some(ev)
    }

    /// Shutter duration as a time delta (zero when unknown).
    pub fn shutter_duration(&self) -> TimeDelta {
        if self.exposure_time <= 0.0 {
            return TimeDelta::zero();
        }
        TimeDelta::nanoseconds((self.exposure_time * 1e9).round() as i64)
    }

    /// Case-insensitive manufacturer family match on the camera make.
    pub fn is_make_family(&self, family: &str) -> bool {
        is_make_family(&self.make, family)
    }
}

pub fn is_make_family(make: &str, family: &str) -> bool {
    make.to_lowercase().contains(&family.to_lowercase())
}

/// Trailing decimal digits of the file stem, e.g. `IMG_0042.CR3` -> 42.
pub fn parse_sequence(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    stem[digits_start..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence(Path::new("/photos/IMG_0042.CR3")), Some(42));
        assert_eq!(parse_sequence(Path::new("DSC9.nef")), Some(9));
        assert_eq!(parse_sequence(Path::new("2024-05-01/_MG_1000.cr2")), Some(1000));
        assert_eq!(parse_sequence(Path::new("IMG_0042a.CR3")), None);
        assert_eq!(parse_sequence(Path::new("holiday.cr3")), None);
        assert_eq!(parse_sequence(Path::new("99999999999.cr3")), None);
    }

    #[test]
    fn test_exposure_value() {
        let mut shot = ShotRecord::new(PathBuf::from("IMG_0001.CR3"), Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(shot.exposure_value(), None);

        shot.f_number = 8.0;
        shot.exposure_time = 1.0 / 64.0;
        shot.iso = 100;
        assert!((shot.exposure_value().unwrap() - 12.0).abs() < 1e-9);

        // Doubling ISO lowers EV by one stop
        shot.iso = 200;
        assert!((shot.exposure_value().unwrap() - 11.0).abs() < 1e-9);

        // Unknown ISO leaves the ISO term out
        shot.iso = 0;
        assert!((shot.exposure_value().unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_shutter_duration() {
        let mut shot = ShotRecord::new(PathBuf::from("a.cr3"), Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(shot.shutter_duration(), TimeDelta::zero());
        shot.exposure_time = 0.25;
        assert_eq!(shot.shutter_duration(), TimeDelta::milliseconds(250));
    }

    #[test]
    fn test_make_family() {
        assert!(is_make_family("Canon", "canon"));
        assert!(is_make_family("CANON INC.", "Canon"));
        assert!(!is_make_family("NIKON CORPORATION", "canon"));
    }
}
