//! Command-line surface

use std::path::PathBuf;

use chrono::TimeDelta;
use clap::{ArgAction, Args, Parser, Subcommand};
use series_detection::SeriesMode;

use crate::config::Config;
use crate::geotag::GeotagOptions;
use crate::offset::parse_time_offset;
use crate::series::{parse_extra_tags, SeriesOptions};

#[derive(Parser, Debug)]
#[command(name = "georaw")]
#[command(about = "Geotag RAW photos from GPX tracks and tag bracketed series in XMP sidecars")]
#[command(version)]
pub struct Cli {
    /// Extra TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Default log filter (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write GPS positions from a GPX track into photo sidecars
    Geotag(GeotagArgs),
    /// Detect HDR and focus brackets and tag them with keywords
    Series(SeriesArgs),
}

impl Commands {
    /// Where to write the JSON run summary, if requested
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            Self::Geotag(args) => args.output.as_ref(),
            Self::Series(args) => args.output.as_ref(),
        }
    }
}

#[derive(Args, Debug)]
pub struct GeotagArgs {
    /// GPX track file
    #[arg(long)]
    pub gpx: PathBuf,

    /// Files, directories or glob patterns separated by ';'
    #[arg(short, long)]
    pub input: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Correction added to camera time, e.g. -30s, 1h30m or 90
    #[arg(long, value_parser = parse_time_offset, allow_hyphen_values = true)]
    pub time_offset: Option<TimeDelta>,

    /// Estimate the camera clock offset when no manual offset is given
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub auto_offset: bool,

    /// Replace GPS data already present in a sidecar
    #[arg(long)]
    pub overwrite_gps: bool,

    /// Save the run summary as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl GeotagArgs {
    pub fn to_options(&self, config: &Config) -> GeotagOptions {
        GeotagOptions {
            gpx: self.gpx.clone(),
            input: self.input.clone(),
            recursive: self.recursive,
            time_offset: self.time_offset.unwrap_or_else(TimeDelta::zero),
            auto_offset: self.auto_offset,
            overwrite_gps: self.overwrite_gps,
            estimator: config.offset,
        }
    }
}

#[derive(Args, Debug)]
pub struct SeriesArgs {
    /// Files, directories or glob patterns separated by ';'
    #[arg(short, long)]
    pub input: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Detection mode: auto, hdr or focus
    #[arg(long)]
    pub mode: Option<SeriesMode>,

    /// Series id prefix (random when omitted)
    #[arg(long)]
    pub prefix: Option<String>,

    /// First series index
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub start_index: i64,

    /// Keyword for HDR brackets
    #[arg(long)]
    pub hdr_tag: Option<String>,

    /// Keyword for focus brackets
    #[arg(long)]
    pub focus_tag: Option<String>,

    /// Additional comma-separated keywords for every tagged shot
    #[arg(long)]
    pub extra_tags: Option<String>,

    /// Only RAW files from this manufacturer are considered
    #[arg(long)]
    pub make_family: Option<String>,

    /// Replace keywords already present in a sidecar
    #[arg(long)]
    pub overwrite_series: bool,

    /// Save the run summary as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SeriesArgs {
    pub fn to_options(&self, config: &Config) -> SeriesOptions {
        let tagging = &config.tagging;
        SeriesOptions {
            input: self.input.clone(),
            recursive: self.recursive,
            mode: self.mode.unwrap_or(tagging.mode),
            prefix: self.prefix.clone().unwrap_or_default(),
            start_index: self.start_index,
            hdr_tag: self.hdr_tag.clone().unwrap_or_else(|| tagging.hdr_tag.clone()),
            focus_tag: self.focus_tag.clone().unwrap_or_else(|| tagging.focus_tag.clone()),
            extra_tags: match &self.extra_tags {
                Some(raw) => parse_extra_tags(raw),
                None => tagging.extra_tags.clone(),
            },
            make_family: self.make_family.clone().unwrap_or_else(|| tagging.make_family.clone()),
            overwrite: self.overwrite_series,
            detection: config.series.clone(),
        }
    }
}
