//! Bracketed series detection for GeoRAW
//!
//! This crate turns per-shot camera metadata into groups of shots that belong
//! to one HDR or focus bracket, and decides which of those groups get tagged.

pub mod anchor;
pub mod exif;
pub mod series;
pub mod shot;

pub use anchor::{AnchorStrategy, TrailingHintAnchor};
pub use exif::{ExiftoolRunner, ExiftoolSource, MetadataSource};
pub use series::{
    sort_shots, GroupVerdict, SeriesConfig, SeriesDetector, SeriesError, SeriesGroup, SeriesKind, SeriesMode,
    SeriesStats,
};
pub use shot::{is_make_family, parse_sequence, ShotRecord};
