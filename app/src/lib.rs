//! GeoRAW application layer
//!
//! Wires the track, series and sidecar crates into two workflows, each
//! producing a [`RunSummary`]: `geotag` writes GPS positions from a GPX track
//! into photo sidecars, `series` tags bracketed shots with keywords.

pub mod cli;
pub mod collect;
pub mod config;
pub mod context;
pub mod error;
mod extract;
pub mod geotag;
pub mod logging;
pub mod offset;
pub mod series;
pub mod summary;

pub use collect::{collect_files, is_merged_candidate, is_raw, CollectError};
pub use config::Config;
pub use context::RunContext;
pub use error::RunError;
pub use geotag::{run_geotag, GeotagOptions};
pub use offset::parse_time_offset;
pub use series::{run_series, SeriesOptions};
pub use summary::{FileResult, FileStatus, RunSummary};
