//! Camera clock offset estimation
//!
//! Reconciles an uncalibrated camera clock with the track clock by taking the
//! median distance between each capture time and its nearest track sample.
//! The result is additive: `corrected = capture + offset`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::track::TrackIndex;

/// Differences larger than this are treated as mismatched clocks rather than offsets.
pub const MAX_OFFSET_WINDOW_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OffsetError {
    #[error("unable to detect offset: no usable samples within {window_secs}s window")]
    NoUsableSamples { window_secs: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetEstimate {
    /// Correction to add to each capture time
    pub offset: TimeDelta,
    /// Number of captures that survived the window filter
    pub samples_used: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OffsetEstimator {
    /// Maximum accepted |track - capture| difference in seconds
    pub max_window_secs: i64,
}

impl Default for OffsetEstimator {
    fn default() -> Self {
        Self {
            max_window_secs: MAX_OFFSET_WINDOW_SECS,
        }
    }
}

impl OffsetEstimator {
    pub fn new(max_window_secs: i64) -> Self {
        Self { max_window_secs }
    }

    /// Estimate the offset from `(capture time, track)` pairs.
    pub fn estimate<'a, I>(&self, pairs: I) -> Result<OffsetEstimate, OffsetError>
    where
        I: IntoIterator<Item = (DateTime<Utc>, &'a TrackIndex)>,
    {
        let window = TimeDelta::seconds(self.max_window_secs);

        let mut diffs: Vec<TimeDelta> = pairs
            .into_iter()
            .filter(|(_, track)| !track.is_empty())
            .map(|(capture, track)| track.nearest_to(capture).time - capture)
            .filter(|diff| *diff <= window && *diff >= -window)
            .collect();

        if diffs.is_empty() {
            return Err(OffsetError::NoUsableSamples {
                window_secs: self.max_window_secs,
            });
        }

        diffs.sort();
        let mid = diffs.len() / 2;
        let offset = if diffs.len() % 2 == 0 {
            (diffs[mid - 1] + diffs[mid]) / 2
        } else {
            diffs[mid]
        };

        Ok(OffsetEstimate {
            offset,
            samples_used: diffs.len(),
        })
    }

    /// Convenience wrapper for the common single-track case.
    pub fn estimate_for_track<I>(&self, track: &TrackIndex, captures: I) -> Result<OffsetEstimate, OffsetError>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        self.estimate(captures.into_iter().map(|capture| (capture, track)))
    }
}
