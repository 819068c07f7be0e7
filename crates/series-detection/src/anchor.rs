//! Anchored HDR triplet detection
//!
//! Some bodies only flag HDR in the maker notes of the merged JPEG/HEIF they
//! write after the burst. That file takes the next free sequence number, so a
//! hint numbered N points at the raw frames N-3, N-2 and N-1. Strategies are
//! pluggable so other naming conventions can be supported without touching the
//! sequential grouping pass.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::series::SeriesConfig;
use crate::shot::ShotRecord;

/// Finds groups whose type is known without looking at exposure spread.
pub trait AnchorStrategy: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Returns anchored groups as indices into `shots`, each group ordered by
    /// frame. An index appears in at most one group.
    fn anchor(&self, shots: &[ShotRecord], hints: &[ShotRecord], config: &SeriesConfig) -> Vec<Vec<usize>>;
}

/// Hint numbered N anchors raw frames N-3..N-1 when their timing matches a
/// physical bracket.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingHintAnchor;

impl AnchorStrategy for TrailingHintAnchor {
    fn name(&self) -> &'static str {
        "trailing-hint"
    }

    fn anchor(&self, shots: &[ShotRecord], hints: &[ShotRecord], config: &SeriesConfig) -> Vec<Vec<usize>> {
        if hints.is_empty() || shots.is_empty() {
            return Vec::new();
        }

        let mut by_seq: HashMap<u32, usize> = HashMap::with_capacity(shots.len());
        for (idx, shot) in shots.iter().enumerate() {
            if let Some(seq) = shot.sequence {
                by_seq.entry(seq).or_insert(idx);
            }
        }

        let mut ordered: Vec<&ShotRecord> = hints.iter().filter(|h| h.sequence.is_some()).collect();
        ordered.sort_by_key(|h| h.sequence);

        let mut claimed: HashSet<usize> = HashSet::new();
        let mut groups = Vec::new();

        for hint in ordered {
            let Some(seq) = hint.sequence.filter(|s| *s >= 3) else {
                continue;
            };
            let frames = [seq - 3, seq - 2, seq - 1].map(|s| by_seq.get(&s).copied());
            let [Some(i1), Some(i2), Some(i3)] = frames else {
                continue;
            };
            if [i1, i2, i3].iter().any(|i| claimed.contains(i)) {
                continue;
            }

            if !bracket_timing_matches(&shots[i1], &shots[i2], &shots[i3], hint, config) {
                debug!(
                    hint = %hint.path.display(),
                    "frames {}..{} do not match bracket timing",
                    seq - 3,
                    seq - 1
                );
                continue;
            }

            claimed.extend([i1, i2, i3]);
            groups.push(vec![i1, i2, i3]);
        }

        groups
    }
}

fn bracket_timing_matches(
    f1: &ShotRecord,
    f2: &ShotRecord,
    f3: &ShotRecord,
    hint: &ShotRecord,
    config: &SeriesConfig,
) -> bool {
    // The merged file carries the first frame's timestamp
    let hint_tolerance = TimeDelta::milliseconds(config.hint_tolerance_ms);
    if !within(f1.capture_time, hint.capture_time, hint_tolerance) {
        return false;
    }

    follows(f1, f2, config) && follows(f2, f3, config)
}

/// `next` starts when `prev`'s shutter closes, give or take the frame tolerance.
fn follows(prev: &ShotRecord, next: &ShotRecord, config: &SeriesConfig) -> bool {
    let shutter = prev.shutter_duration();
    let expected = prev.capture_time + shutter;
    within(expected, next.capture_time, config.frame_tolerance(shutter))
}

fn within(a: DateTime<Utc>, b: DateTime<Utc>, tolerance: TimeDelta) -> bool {
    (b - a).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_557_600_000 + ms).unwrap()
    }

    fn frame(name: &str, ms: i64, exposure: f64) -> ShotRecord {
        let mut shot = ShotRecord::new(PathBuf::from(name), at_ms(ms));
        shot.make = "Canon".to_string();
        shot.exposure_time = exposure;
        shot.f_number = 8.0;
        shot.iso = 100;
        shot
    }

    fn bracket() -> Vec<ShotRecord> {
        vec![
            frame("IMG_0101.CR3", 0, 0.5),
            frame("IMG_0102.CR3", 500, 0.125),
            frame("IMG_0103.CR3", 625, 1.0),
        ]
    }

    #[test]
    fn test_hint_anchors_preceding_frames() {
        let hints = vec![frame("IMG_0104.HIF", 40, 0.0)];
        let groups = TrailingHintAnchor.anchor(&bracket(), &hints, &SeriesConfig::default());
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_hint_time_must_match_first_frame() {
        let hints = vec![frame("IMG_0104.HIF", 250, 0.0)];
        let groups = TrailingHintAnchor.anchor(&bracket(), &hints, &SeriesConfig::default());
        assert!(groups.is_empty());
    }

    #[test]
    fn test_frame_gap_must_follow_shutter() {
        let mut shots = bracket();
        // 0.5s shutter allows 500ms +/- 55ms
        shots[1].capture_time = at_ms(560);
        shots[2].capture_time = at_ms(685);
        let hints = vec![frame("IMG_0104.HIF", 0, 0.0)];
        assert!(TrailingHintAnchor.anchor(&shots, &hints, &SeriesConfig::default()).is_empty());

        shots[1].capture_time = at_ms(554);
        shots[2].capture_time = at_ms(679);
        assert_eq!(
            TrailingHintAnchor.anchor(&shots, &hints, &SeriesConfig::default()).len(),
            1
        );
    }

    #[test]
    fn test_missing_frame_or_small_sequence_is_ignored() {
        let mut shots = bracket();
        shots.remove(1);
        let hints = vec![frame("IMG_0104.HIF", 0, 0.0), frame("IMG_0002.HIF", 0, 0.0)];
        assert!(TrailingHintAnchor.anchor(&shots, &hints, &SeriesConfig::default()).is_empty());
    }

    #[test]
    fn test_frames_are_claimed_once() {
        let hints = vec![frame("IMG_0104.HIF", 0, 0.0), frame("IMG_0104.JPG", 0, 0.0)];
        let groups = TrailingHintAnchor.anchor(&bracket(), &hints, &SeriesConfig::default());
        assert_eq!(groups.len(), 1);
    }
}
