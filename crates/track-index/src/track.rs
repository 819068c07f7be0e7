//! Time-indexed GPS track storage for GeoRAW
//!
//! A [`TrackIndex`] holds track samples sorted by timestamp and answers
//! "where was the camera at time T" either by linear interpolation between
//! the two bracketing samples or by picking the chronologically nearest one.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in signed degrees (north positive)
    pub latitude: f64,
    /// Longitude in signed degrees (east positive)
    pub longitude: f64,
    /// Altitude in meters, when the track recorded one
    pub altitude: Option<f64>,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    pub time: DateTime<Utc>,
    pub coord: Coordinate,
}

impl TrackSample {
    pub fn new(time: DateTime<Utc>, coord: Coordinate) -> Self {
        Self { time, coord }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("track contains no samples")]
    EmptyTrack,
    #[error("timestamp {0} outside track bounds")]
    OutOfBounds(DateTime<Utc>),
}

/// Immutable, time-sorted store of track samples.
#[derive(Debug, Clone)]
pub struct TrackIndex {
    samples: Vec<TrackSample>,
}

impl TrackIndex {
    /// Build the index. Samples are stable-sorted by timestamp so ties keep
    /// their input order.
    pub fn load(mut samples: Vec<TrackSample>) -> Result<Self, TrackError> {
        if samples.is_empty() {
            return Err(TrackError::EmptyTrack);
        }
        samples.sort_by_key(|s| s.time);
        Ok(Self { samples })
    }

    /// Number of indexed samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    /// First and last timestamps of the track (epoch pair when empty).
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (first.time, last.time),
            _ => (DateTime::<Utc>::default(), DateTime::<Utc>::default()),
        }
    }

    /// Interpolated position at `t`.
    ///
    /// Fails with [`TrackError::OutOfBounds`] when `t` lies strictly before the
    /// first or after the last sample. An exact timestamp hit returns that
    /// sample's coordinate unchanged.
    pub fn interpolate_at(&self, t: DateTime<Utc>) -> Result<Coordinate, TrackError> {
        let (first, last) = match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(TrackError::EmptyTrack),
        };
        if t < first.time || t > last.time {
            return Err(TrackError::OutOfBounds(t));
        }

        let idx = self.samples.partition_point(|s| s.time < t);
        let next = &self.samples[idx];
        if next.time == t || idx == 0 {
            return Ok(next.coord);
        }
        let prev = &self.samples[idx - 1];

        let total = seconds(next.time - prev.time);
        if total <= 0.0 {
            return Ok(prev.coord);
        }
        let progress = seconds(t - prev.time) / total;

        Ok(Coordinate {
            latitude: lerp(prev.coord.latitude, next.coord.latitude, progress),
            longitude: lerp(prev.coord.longitude, next.coord.longitude, progress),
            altitude: match (prev.coord.altitude, next.coord.altitude) {
                (Some(a), Some(b)) => Some(lerp(a, b, progress)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            },
        })
    }

    /// Sample chronologically closest to `t`.
    ///
    /// Clamps to the first/last sample outside the track range; ties between
    /// the bracketing pair favor the earlier sample.
    pub fn nearest_to(&self, t: DateTime<Utc>) -> &TrackSample {
        let last_idx = self.samples.len() - 1;
        if t <= self.samples[0].time {
            return &self.samples[0];
        }
        if t >= self.samples[last_idx].time {
            return &self.samples[last_idx];
        }

        let idx = self.samples.partition_point(|s| s.time < t);
        let next = &self.samples[idx];
        if next.time == t {
            return next;
        }
        let prev = &self.samples[idx - 1];
        if t - prev.time <= next.time - t {
            prev
        } else {
            next
        }
    }
}

fn lerp(a: f64, b: f64, progress: f64) -> f64 {
    a + progress * (b - a)
}

/// Fractional seconds of a signed duration.
pub(crate) fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
