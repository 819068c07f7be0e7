//! Geotagging workflow: GPX track + RAW captures -> GPS in sidecars

use std::path::PathBuf;

use chrono::{SecondsFormat, TimeDelta};
use rayon::prelude::*;
use series_detection::{MetadataSource, ShotRecord};
use tracing::{error, info, warn};
use track_index::{load_gpx, OffsetEstimator, TrackError, TrackIndex};
use xmp_sidecar::{sidecar_path, SidecarStore, WriteOutcome};

use crate::collect::{collect_files, is_raw, is_sidecar};
use crate::context::RunContext;
use crate::error::RunError;
use crate::extract::{extract_all, Extraction};
use crate::offset::{format_offset, resolve_offset};
use crate::summary::{FileResult, FileStatus, RunSummary};

#[derive(Debug, Clone)]
pub struct GeotagOptions {
    pub gpx: PathBuf,
    /// File, directory or glob entries separated by `;` or newlines
    pub input: String,
    pub recursive: bool,
    /// Manual correction added to every capture time
    pub time_offset: TimeDelta,
    pub auto_offset: bool,
    pub overwrite_gps: bool,
    pub estimator: OffsetEstimator,
}

impl GeotagOptions {
    pub fn new(gpx: impl Into<PathBuf>, input: impl Into<String>) -> Self {
        Self {
            gpx: gpx.into(),
            input: input.into(),
            recursive: false,
            time_offset: TimeDelta::zero(),
            auto_offset: true,
            overwrite_gps: false,
            estimator: OffsetEstimator::default(),
        }
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.gpx.as_os_str().is_empty() {
            return Err(RunError::InvalidOptions("GPX path is required".into()));
        }
        if self.input.trim().is_empty() {
            return Err(RunError::InvalidOptions("input path is required".into()));
        }
        Ok(())
    }
}

/// Geotag every RAW file named by `opts.input`.
///
/// Per-file problems are recorded in the returned summary; only problems that
/// make the whole run meaningless are returned as errors.
pub fn run_geotag(
    opts: &GeotagOptions,
    source: &dyn MetadataSource,
    ctx: &RunContext,
) -> Result<RunSummary, RunError> {
    opts.validate()?;
    info!(
        "Starting geotag with GPX={} input={} recursive={} offset={} autoOffset={} overwrite={}",
        opts.gpx.display(),
        opts.input,
        opts.recursive,
        format_offset(opts.time_offset),
        opts.auto_offset,
        opts.overwrite_gps
    );

    let track = load_gpx(&opts.gpx)?;
    let (start, end) = track.bounds();
    info!(
        "GPX track loaded with {} points ({} .. {})",
        track.len(),
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let files = collect_files(&opts.input, opts.recursive)?;
    if files.is_empty() {
        return Err(RunError::NoFiles);
    }
    // Sidecars may sit next to the photos; they are not inputs.
    let candidates: Vec<PathBuf> = files.into_iter().filter(|p| !is_sidecar(p)).collect();
    ctx.start(candidates.len());

    let mut summary = RunSummary::default();
    let mut jobs: Vec<ShotRecord> = Vec::new();

    let extracted = extract_all(&candidates, source, ctx, is_raw)?;
    for (path, extraction) in candidates.iter().zip(extracted) {
        match extraction {
            Extraction::NotWanted => {
                warn!("Skipping non-RAW file: {}", path.display());
                summary.record(FileResult::new(path, FileStatus::Skipped, "Not a RAW file"));
                ctx.advance();
            }
            Extraction::Failed(message) => {
                warn!("Failed to read metadata for {}: {message}", path.display());
                summary.record(FileResult::new(path, FileStatus::MetaError, message));
                ctx.advance();
            }
            Extraction::Shot(shot) => jobs.push(shot),
        }
    }
    if jobs.is_empty() {
        return Err(RunError::NoUsableFiles { kind: "RAW".into() });
    }

    let captures: Vec<_> = jobs.iter().map(|shot| shot.capture_time).collect();
    let offset = resolve_offset(opts.time_offset, opts.auto_offset, &opts.estimator, &track, &captures);

    let store = SidecarStore::new();
    let results: Vec<Option<FileResult>> = jobs
        .par_iter()
        .map(|shot| {
            if ctx.is_cancelled() {
                return None;
            }
            let result = geotag_one(shot, offset, &track, &store, opts.overwrite_gps);
            ctx.advance();
            Some(result)
        })
        .collect();
    ctx.check_cancelled()?;

    for result in results.into_iter().flatten() {
        summary.record(result);
    }
    info!("{summary}");
    Ok(summary)
}

fn geotag_one(
    shot: &ShotRecord,
    offset: TimeDelta,
    track: &TrackIndex,
    store: &SidecarStore,
    overwrite: bool,
) -> FileResult {
    let path = shot.path.as_path();
    let capture = shot.capture_time + offset;
    let capture_text = capture.to_rfc3339_opts(SecondsFormat::Secs, true);

    let coord = match track.interpolate_at(capture) {
        Ok(coord) => coord,
        Err(err @ TrackError::OutOfBounds(_)) => {
            warn!("Capture time outside GPX coverage for {} ({capture_text}): {err}", path.display());
            return FileResult::new(path, FileStatus::OutOfTrack, err.to_string());
        }
        Err(err) => {
            error!("No matching GPX point for {} ({capture_text}): {err}", path.display());
            return FileResult::new(path, FileStatus::Failed, err.to_string());
        }
    };

    let sidecar = sidecar_path(path);
    match store.merge_gps(&sidecar, &coord, capture, overwrite) {
        Ok(WriteOutcome::Written) => {
            info!(
                "Geotagged {} ({} {}, {capture_text}) -> {} [lat={:.6} lon={:.6} alt={}]",
                path.display(),
                shot.make,
                shot.model,
                sidecar.display(),
                coord.latitude,
                coord.longitude,
                coord.altitude.map_or_else(|| "n/a".to_string(), |alt| format!("{alt:.2}m"))
            );
            FileResult::new(path, FileStatus::Processed, sidecar.display().to_string())
        }
        Ok(WriteOutcome::Unchanged) => {
            info!("Sidecar for {} already holds this position", path.display());
            FileResult::new(path, FileStatus::Unchanged, "Sidecar unchanged")
        }
        Err(err) if err.is_already_present() => {
            info!(
                "Skipping already geotagged sidecar {} (use --overwrite-gps to replace)",
                sidecar.display()
            );
            FileResult::new(path, FileStatus::Unchanged, "GPS already present")
        }
        Err(err) => {
            error!("Failed to write sidecar for {}: {err}", path.display());
            FileResult::new(path, FileStatus::Failed, err.to_string())
        }
    }
}
