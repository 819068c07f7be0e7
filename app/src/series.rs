//! Series tagging workflow: bracketed shots -> keywords in sidecars

use std::path::PathBuf;

use rayon::prelude::*;
use series_detection::{GroupVerdict, MetadataSource, SeriesConfig, SeriesDetector, SeriesKind, SeriesMode, ShotRecord};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use xmp_sidecar::{sidecar_path, SidecarStore, WriteOutcome};

use crate::collect::{collect_files, is_merged_candidate, is_raw, is_sidecar};
use crate::context::RunContext;
use crate::error::RunError;
use crate::extract::{extract_all, Extraction};
use crate::summary::{FileResult, FileStatus, RunSummary};

pub const DEFAULT_HDR_TAG: &str = "hdr_mode";
pub const DEFAULT_FOCUS_TAG: &str = "focus_br";
pub const DEFAULT_MAKE_FAMILY: &str = "canon";
pub const MIN_PREFIX_LEN: usize = 3;
const RANDOM_PREFIX_LEN: usize = 6;
const PREFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone)]
pub struct SeriesOptions {
    /// File, directory or glob entries separated by `;` or newlines
    pub input: String,
    pub recursive: bool,
    pub mode: SeriesMode,
    /// Series id prefix; a random one is generated when empty
    pub prefix: String,
    /// First series index; values below 1 are treated as 1
    pub start_index: i64,
    pub hdr_tag: String,
    pub focus_tag: String,
    pub extra_tags: Vec<String>,
    /// Only RAW files whose make contains this are considered
    pub make_family: String,
    pub overwrite: bool,
    pub detection: SeriesConfig,
}

impl SeriesOptions {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            recursive: false,
            mode: SeriesMode::Auto,
            prefix: String::new(),
            start_index: 1,
            hdr_tag: DEFAULT_HDR_TAG.to_string(),
            focus_tag: DEFAULT_FOCUS_TAG.to_string(),
            extra_tags: Vec::new(),
            make_family: DEFAULT_MAKE_FAMILY.to_string(),
            overwrite: false,
            detection: SeriesConfig::default(),
        }
    }

    fn resolve(&self) -> Result<Resolved, RunError> {
        if self.input.trim().is_empty() {
            return Err(RunError::InvalidOptions("input path is required".into()));
        }

        let prefix = match self.prefix.trim() {
            "" => random_prefix(),
            given => given.to_string(),
        };
        if prefix.chars().count() < MIN_PREFIX_LEN {
            return Err(RunError::InvalidOptions(format!(
                "prefix must be at least {MIN_PREFIX_LEN} characters"
            )));
        }

        let or_default = |tag: &str, default: &str| match tag.trim() {
            "" => default.to_string(),
            tag => tag.to_string(),
        };
        let family = match self.make_family.trim() {
            "" => DEFAULT_MAKE_FAMILY.to_string(),
            family => family.to_string(),
        };

        Ok(Resolved {
            prefix,
            start_index: self.start_index.max(1) as u64,
            hdr_tag: or_default(&self.hdr_tag, DEFAULT_HDR_TAG),
            focus_tag: or_default(&self.focus_tag, DEFAULT_FOCUS_TAG),
            extra_tags: self
                .extra_tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            family,
        })
    }
}

struct Resolved {
    prefix: String,
    start_index: u64,
    hdr_tag: String,
    focus_tag: String,
    extra_tags: Vec<String>,
    family: String,
}

impl Resolved {
    fn type_tag(&self, kind: SeriesKind) -> &str {
        match kind {
            SeriesKind::Hdr => &self.hdr_tag,
            SeriesKind::Focus => &self.focus_tag,
        }
    }

    /// `canon` -> `Canon`, for messages
    fn family_label(&self) -> String {
        let mut chars = self.family.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Split a comma-separated tag list, dropping blanks.
pub fn parse_extra_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Six random characters from `A-Z0-9`.
pub fn random_prefix() -> String {
    // Bytes 6 and 8 carry the UUID version and variant bits
    let random_bytes = std::iter::repeat_with(Uuid::new_v4).flat_map(|id| {
        let bytes = *id.as_bytes();
        bytes
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != 6 && *i != 8)
            .map(|(_, b)| b)
    });
    prefix_from_bytes(random_bytes)
}

/// Map uniform bytes onto the prefix alphabet, rejecting the tail of the byte
/// range that would make the low symbols more likely.
fn prefix_from_bytes(bytes: impl IntoIterator<Item = u8>) -> String {
    let symbols = PREFIX_ALPHABET.len();
    let limit = 256 - 256 % symbols;
    bytes
        .into_iter()
        .filter(|b| usize::from(*b) < limit)
        .take(RANDOM_PREFIX_LEN)
        .map(|b| PREFIX_ALPHABET[usize::from(b) % symbols] as char)
        .collect()
}

/// Detect bracketed series among the files named by `opts.input` and tag
/// each member's sidecar with the series type, id and extra tags.
pub fn run_series(
    opts: &SeriesOptions,
    source: &dyn MetadataSource,
    ctx: &RunContext,
) -> Result<RunSummary, RunError> {
    let resolved = opts.resolve()?;
    info!(
        "Starting series tagging with input={} recursive={} mode={} overwrite={} prefix={} start={} extraTags={:?}",
        opts.input,
        opts.recursive,
        opts.mode,
        opts.overwrite,
        resolved.prefix,
        resolved.start_index,
        resolved.extra_tags.join(",")
    );

    let files = collect_files(&opts.input, opts.recursive)?;
    if files.is_empty() {
        return Err(RunError::NoFiles);
    }
    let candidates: Vec<PathBuf> = files.into_iter().filter(|p| !is_sidecar(p)).collect();
    // Merged outputs only hint; they are never reported on.
    ctx.start(candidates.iter().filter(|p| !is_merged_candidate(p)).count());

    let mut summary = RunSummary::default();
    let mut shots: Vec<ShotRecord> = Vec::new();
    let mut hints: Vec<ShotRecord> = Vec::new();

    let extracted = extract_all(&candidates, source, ctx, |p| is_raw(p) || is_merged_candidate(p))?;
    for (path, extraction) in candidates.iter().zip(extracted) {
        if is_merged_candidate(path) {
            match extraction {
                Extraction::Shot(hint) if hint.is_make_family(&resolved.family) => hints.push(hint),
                Extraction::Failed(message) => {
                    warn!("Failed to read metadata for {}: {message}", path.display());
                }
                _ => {}
            }
            continue;
        }

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
            Extraction::Shot(shot) if !shot.is_make_family(&resolved.family) => {
                warn!("Skipping non-{} file: {} ({})", resolved.family_label(), path.display(), shot.make);
                summary.record(FileResult::new(
                    path,
                    FileStatus::Skipped,
                    format!("Not a {} RAW", resolved.family_label()),
                ));
                ctx.advance();
            }
            Extraction::Shot(shot) => shots.push(shot),
        }
    }
    if shots.is_empty() {
        return Err(RunError::NoUsableFiles {
            kind: format!("{} RAW", resolved.family_label()),
        });
    }

    let detector = SeriesDetector::new(opts.detection.clone());
    let groups = detector.detect(shots, &hints);
    if groups.is_empty() {
        return Err(RunError::NoCandidates);
    }

    let store = SidecarStore::new();
    let mut next_index = resolved.start_index;

    for group in &groups {
        ctx.check_cancelled()?;

        let kind = match detector.classify(group, opts.mode) {
            GroupVerdict::Tag(kind) => kind,
            verdict => {
                let message = match verdict {
                    GroupVerdict::TooShort => "Series too short",
                    _ => "Not detected as HDR",
                };
                for shot in &group.shots {
                    debug!("{}: {message}", shot.path.display());
                    summary.record(FileResult::new(&shot.path, FileStatus::Skipped, message));
                    ctx.advance();
                }
                continue;
            }
        };

        let series_id = format!("{}_{next_index:05}", resolved.prefix);
        next_index += 1;

        let type_tag = resolved.type_tag(kind);
        let mut tags = vec![type_tag.to_string(), series_id.clone()];
        tags.extend(resolved.extra_tags.iter().cloned());

        let stats = group.stats();
        debug!(
            series = %series_id,
            shots = stats.shot_count,
            duration_ms = stats.duration_ms,
            ev_spread = ?stats.ev_spread,
            "tagging {kind} series"
        );

        let results: Vec<Option<FileResult>> = group
            .shots
            .par_iter()
            .map(|shot| {
                if ctx.is_cancelled() {
                    return None;
                }
                let result = tag_one(shot, type_tag, &series_id, &tags, &store, opts.overwrite);
                ctx.advance();
                Some(result)
            })
            .collect();
        ctx.check_cancelled()?;

        for result in results.into_iter().flatten() {
            summary.record(result);
        }
    }

    info!("{summary}");
    Ok(summary)
}

fn tag_one(
    shot: &ShotRecord,
    type_tag: &str,
    series_id: &str,
    tags: &[String],
    store: &SidecarStore,
    overwrite: bool,
) -> FileResult {
    let path = shot.path.as_path();
    let sidecar = sidecar_path(path);

    match store.merge_keywords(&sidecar, tags, overwrite) {
        Ok(WriteOutcome::Written) => {
            info!("Tagged {} as {type_tag} ({series_id}) -> {}", path.display(), sidecar.display());
            FileResult::new(path, FileStatus::Processed, format!("{type_tag} [{series_id}]"))
        }
        Ok(WriteOutcome::Unchanged) => FileResult::new(path, FileStatus::Unchanged, "Sidecar unchanged"),
        Err(err) if err.is_already_present() => {
            info!("Series tags already present for {}", path.display());
            FileResult::new(path, FileStatus::Unchanged, "Series tags already present")
        }
        Err(err) => {
            error!("Failed to write sidecar for {}: {err}", path.display());
            FileResult::new(path, FileStatus::Failed, err.to_string())
        }
    }
}
