//! GPX track loading
//!
//! Collects every timestamped point of every track segment into a
//! [`TrackIndex`]. Points without a timestamp cannot be placed on the timeline
//! and are dropped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::track::{Coordinate, TrackError, TrackIndex, TrackSample};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open GPX file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse GPX data: {0}")]
    Parse(String),
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// Load and index a GPX file.
pub fn load_gpx(path: &Path) -> Result<TrackIndex, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let samples = read_samples(BufReader::new(file))?;
    Ok(TrackIndex::load(samples)?)
}

/// Parse GPX data into unsorted track samples.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<TrackSample>, LoadError> {
    let doc = gpx::read(reader).map_err(|e| LoadError::Parse(e.to_string()))?;

    let mut samples = Vec::new();
    let mut untimed = 0usize;
    for track in doc.tracks {
        for segment in track.segments {
            for point in segment.points {
                let Some(time) = point.time else {
                    untimed += 1;
                    continue;
                };
                let iso = time.format().map_err(|e| LoadError::Parse(e.to_string()))?;
                let time = DateTime::parse_from_rfc3339(&iso)
                    .map_err(|e| LoadError::Parse(e.to_string()))?
                    .with_timezone(&Utc);

                let geo = point.point();
                samples.push(TrackSample::new(
                    time,
                    Coordinate::new(geo.y(), geo.x(), point.elevation),
                ));
            }
        }
    }

    if untimed > 0 {
        debug!(untimed, "dropped GPX points without timestamps");
    }
    Ok(samples)
}
