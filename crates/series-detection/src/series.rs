//! Series detection and classification for GeoRAW
//!
//! Detection runs in two passes over a batch of shots from one camera family:
//! an [`AnchorStrategy`] first claims triplets it can prove are HDR brackets,
//! then the remaining shots are grouped left to right by filename sequence and
//! capture-time gap. Each group is then classified as HDR, focus bracketing or
//! "not a series" according to the requested [`SeriesMode`].

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::anchor::{AnchorStrategy, TrailingHintAnchor};
use crate::shot::ShotRecord;

pub const MIN_SERIES_LEN: usize = 3;
/// Gap allowed when either sequence number is unknown
pub const MAX_GAP_UNKNOWN_MS: i64 = 1100;
/// Gap allowed between strictly consecutive sequence numbers
pub const MAX_GAP_SEQUENTIAL_MS: i64 = 2200;
pub const EV_SPREAD_THRESHOLD: f64 = 0.7;
pub const HINT_TOLERANCE_MS: i64 = 200;
pub const FRAME_TOLERANCE_BASE_MS: i64 = 50;
pub const FRAME_TOLERANCE_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Groups shorter than this are reported but never tagged
    pub min_series_len: usize,
    /// Maximum gap between shots when a sequence number is missing (milliseconds)
    pub max_gap_unknown_ms: i64,
    /// Maximum gap between shots with consecutive sequence numbers (milliseconds)
    pub max_gap_sequential_ms: i64,
    /// Minimum EV spread for a group to count as exposure bracketed
    pub ev_spread_threshold: f64,
    /// Allowed distance between a hint record and the first anchored frame (milliseconds)
    pub hint_tolerance_ms: i64,
    /// Fixed part of the anchored frame-to-frame tolerance (milliseconds)
    pub frame_tolerance_base_ms: i64,
    /// Shutter-proportional part of the anchored frame-to-frame tolerance
    pub frame_tolerance_ratio: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            min_series_len: MIN_SERIES_LEN,
            max_gap_unknown_ms: MAX_GAP_UNKNOWN_MS,
            max_gap_sequential_ms: MAX_GAP_SEQUENTIAL_MS,
            ev_spread_threshold: EV_SPREAD_THRESHOLD,
            hint_tolerance_ms: HINT_TOLERANCE_MS,
            frame_tolerance_base_ms: FRAME_TOLERANCE_BASE_MS,
            frame_tolerance_ratio: FRAME_TOLERANCE_RATIO,
        }
    }
}

impl SeriesConfig {
    /// Tolerance for a frame following a shutter of the given length
    pub fn frame_tolerance(&self, shutter: TimeDelta) -> TimeDelta {
        let proportional = shutter.num_nanoseconds().unwrap_or(i64::MAX) as f64 * self.frame_tolerance_ratio;
        TimeDelta::milliseconds(self.frame_tolerance_base_ms) + TimeDelta::nanoseconds(proportional as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("invalid mode {0:?} (expected auto, hdr, or focus)")]
    InvalidMode(String),
}

/// Requested detection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesMode {
    /// Maker-note hint or exposure spread decides
    #[default]
    Auto,
    /// Every long-enough group is an HDR bracket
    Hdr,
    /// Every long-enough group is a focus bracket
    Focus,
}

impl FromStr for SeriesMode {
    type Err = SeriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "hdr" => Ok(Self::Hdr),
            "focus" => Ok(Self::Focus),
            _ => Err(SeriesError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for SeriesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Hdr => "hdr",
            Self::Focus => "focus",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Hdr,
    Focus,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hdr => f.write_str("hdr"),
            Self::Focus => f.write_str("focus"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesGroup {
    /// Shots in this group, in capture order
    pub shots: Vec<ShotRecord>,
    /// Type decided by an anchor strategy, bypassing classification
    pub forced: Option<SeriesKind>,
}

impl SeriesGroup {
    pub fn new(shots: Vec<ShotRecord>, forced: Option<SeriesKind>) -> Self {
        Self { shots, forced }
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    /// Any member carries the maker-note HDR flag
    pub fn has_hdr_hint(&self) -> bool {
        self.shots.iter().any(|s| s.hdr_hint)
    }

    /// Max minus min exposure value over members with known exposure.
    pub fn ev_spread(&self) -> Option<f64> {
        let mut values = self.shots.iter().filter_map(ShotRecord::exposure_value);
        let first = values.next()?;
        let (min, max) = values.fold((first, first), |(lo, hi), ev| (lo.min(ev), hi.max(ev)));
        Some(max - min)
    }

    pub fn stats(&self) -> SeriesStats {
        let duration_ms = match (self.shots.first(), self.shots.last()) {
            (Some(first), Some(last)) => (last.capture_time - first.capture_time).num_milliseconds(),
            _ => 0,
        };

        let gaps: Vec<i64> = self
            .shots
            .windows(2)
            .map(|pair| (pair[1].capture_time - pair[0].capture_time).num_milliseconds())
            .collect();
        let avg_gap_ms = if gaps.is_empty() {
            0.0
        } else {
            gaps.iter().sum::<i64>() as f64 / gaps.len() as f64
        };

        SeriesStats {
            shot_count: self.shots.len(),
            duration_ms,
            avg_gap_ms,
            ev_spread: self.ev_spread(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub shot_count: usize,
    pub duration_ms: i64,
    pub avg_gap_ms: f64,
    pub ev_spread: Option<f64>,
}

/// Outcome of classifying one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupVerdict {
    Tag(SeriesKind),
    /// Fewer shots than the configured minimum
    TooShort,
    /// Auto mode found neither a hint nor enough exposure spread
    NotDetected,
}

pub struct SeriesDetector {
    config: SeriesConfig,
    anchor: Box<dyn AnchorStrategy>,
}

impl SeriesDetector {
    pub fn new(config: SeriesConfig) -> Self {
        Self {
            config,
            anchor: Box::new(TrailingHintAnchor),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(SeriesConfig::default())
    }

    /// Replace the anchored detection heuristic.
    pub fn with_anchor(mut self, anchor: Box<dyn AnchorStrategy>) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Partition `shots` into groups.
    ///
    /// `hints` are low-confidence records (merged JPEG/HEIF outputs) that may
    /// anchor raw frames but never become group members themselves. Anchored
    /// groups come first, followed by the sequential groups in capture order.
    /// Groups below the minimum length are returned too so the caller can
    /// report them.
    pub fn detect(&self, mut shots: Vec<ShotRecord>, hints: &[ShotRecord]) -> Vec<SeriesGroup> {
        if shots.is_empty() {
            return Vec::new();
        }
        sort_shots(&mut shots);

        let anchored = self.anchor.anchor(&shots, hints, &self.config);
        let mut slots: Vec<Option<ShotRecord>> = shots.into_iter().map(Some).collect();
        let mut groups = Vec::new();

        for indices in anchored {
            // Skip groups that reach outside the batch or reuse a claimed shot
            if indices.is_empty() || !indices.iter().all(|i| slots.get(*i).is_some_and(Option::is_some)) {
                continue;
            }
            let members: Vec<ShotRecord> = indices.iter().filter_map(|i| slots[*i].take()).collect();
            debug!(
                strategy = self.anchor.name(),
                first = %members[0].path.display(),
                "anchored {} frame HDR bracket",
                members.len()
            );
            groups.push(SeriesGroup::new(members, Some(SeriesKind::Hdr)));
        }
        let anchored_count = groups.len();

        let remaining: Vec<ShotRecord> = slots.into_iter().flatten().collect();
        groups.extend(self.build_groups(remaining));

        info!(
            "detected {} groups ({} anchored)",
            groups.len(),
            anchored_count
        );
        groups
    }

    /// Decide whether and how a group gets tagged.
    pub fn classify(&self, group: &SeriesGroup, mode: SeriesMode) -> GroupVerdict {
        if group.len() < self.config.min_series_len {
            return GroupVerdict::TooShort;
        }
        if let Some(kind) = group.forced {
            return GroupVerdict::Tag(kind);
        }

        match mode {
            SeriesMode::Hdr => GroupVerdict::Tag(SeriesKind::Hdr),
            SeriesMode::Focus => GroupVerdict::Tag(SeriesKind::Focus),
            SeriesMode::Auto => {
                if group.has_hdr_hint() {
                    return GroupVerdict::Tag(SeriesKind::Hdr);
                }
                match group.ev_spread() {
                    Some(spread) if spread >= self.config.ev_spread_threshold => GroupVerdict::Tag(SeriesKind::Hdr),
                    _ => GroupVerdict::NotDetected,
                }
            }
        }
    }

    /// Whether `next` continues the group ending in `prev`.
    pub fn same_series(&self, prev: &ShotRecord, next: &ShotRecord) -> bool {
        let gap = next.capture_time - prev.capture_time;

        let allowed = match (prev.sequence, next.sequence) {
            (Some(a), Some(b)) => {
                if a.checked_add(1) != Some(b) {
                    return false;
                }
                self.config.max_gap_sequential_ms
            }
            _ => self.config.max_gap_unknown_ms,
        };

        gap >= TimeDelta::zero() && gap <= TimeDelta::milliseconds(allowed)
    }

    fn build_groups(&self, shots: Vec<ShotRecord>) -> Vec<SeriesGroup> {
        let mut groups = Vec::new();
        let mut current: Vec<ShotRecord> = Vec::new();

        for shot in shots {
            let extends = current.last().map_or(true, |last| self.same_series(last, &shot));
            if !extends {
                groups.push(SeriesGroup::new(std::mem::take(&mut current), None));
            }
            current.push(shot);
        }
        if !current.is_empty() {
            groups.push(SeriesGroup::new(current, None));
        }
        groups
    }
}

impl Default for SeriesDetector {
    fn default() -> Self {
        Self::with_default_config()
    }
}

/// Capture order; ties broken by sequence number (unknown first) then path.
pub fn sort_shots(shots: &mut [ShotRecord]) {
    shots.sort_by(|a, b| {
        a.capture_time
            .cmp(&b.capture_time)
            .then_with(|| a.sequence.cmp(&b.sequence))
            .then_with(|| a.path.cmp(&b.path))
    });
}
