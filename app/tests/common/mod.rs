#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use series_detection::{MetadataSource, ShotRecord};

/// Metadata served from memory, keyed by path.
#[derive(Default)]
pub struct MemorySource {
    records: HashMap<PathBuf, ShotRecord>,
}

impl MemorySource {
    pub fn insert(&mut self, shot: ShotRecord) {
        self.records.insert(shot.path.clone(), shot);
    }
}

impl MetadataSource for MemorySource {
    fn extract(&self, path: &Path) -> Result<ShotRecord> {
        self.records
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no EXIF data in {}", path.display()))
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    base_time() + TimeDelta::milliseconds(ms)
}

/// Create an empty file (parents included) and return its path.
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, b"").unwrap();
    path
}

/// A Canon shot with full exposure data.
pub fn canon_shot(path: &Path, time: DateTime<Utc>, exposure_time: f64) -> ShotRecord {
    let mut shot = ShotRecord::new(path.to_path_buf(), time);
    shot.make = "Canon".into();
    shot.model = "Canon EOS R5".into();
    shot.exposure_time = exposure_time;
    shot.f_number = 8.0;
    shot.iso = 100;
    shot
}

/// Write a GPX file with one point per `(seconds after base, lat, lon, ele)`.
pub fn write_gpx(dir: &Path, points: &[(i64, f64, f64, f64)]) -> PathBuf {
    let mut body = String::new();
    for (secs, lat, lon, ele) in points {
        let time = (base_time() + TimeDelta::seconds(*secs)).format("%Y-%m-%dT%H:%M:%SZ");
        body.push_str(&format!(
            "      <trkpt lat=\"{lat}\" lon=\"{lon}\"><ele>{ele}</ele><time>{time}</time></trkpt>\n"
        ));
    }
    let gpx = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<gpx version=\"1.1\" creator=\"georaw-tests\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n\
  <trk>\n    <trkseg>\n{body}    </trkseg>\n  </trk>\n</gpx>\n"
    );
    let path = dir.join("track.gpx");
    fs::write(&path, gpx).unwrap();
    path
}
