//! GPS track indexing for GeoRAW
//!
//! This crate answers where the camera was at a given instant by
//! interpolating a GPX track, and estimates the clock offset between an
//! uncalibrated camera and the track recorder.

pub mod loader;
pub mod offset;
pub mod track;

pub use loader::{load_gpx, read_samples, LoadError};
pub use offset::{OffsetError, OffsetEstimate, OffsetEstimator, MAX_OFFSET_WINDOW_SECS};
pub use track::{Coordinate, TrackError, TrackIndex, TrackSample};
