//! Parallel metadata extraction shared by both workflows

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use series_detection::{MetadataSource, ShotRecord};

use crate::context::RunContext;
use crate::error::RunError;

pub(crate) enum Extraction {
    /// The path was not selected for extraction
    NotWanted,
    Shot(ShotRecord),
    Failed(String),
}

/// Extract metadata for every path `wanted` accepts, in parallel.
///
/// The output is index-aligned with `paths`. Extractor errors and panics both
/// come back as [`Extraction::Failed`].
pub(crate) fn extract_all<F>(
    paths: &[PathBuf],
    source: &dyn MetadataSource,
    ctx: &RunContext,
    wanted: F,
) -> Result<Vec<Extraction>, RunError>
where
    F: Fn(&Path) -> bool + Sync,
{
    let extracted = paths
        .par_iter()
        .map(|path| {
            if ctx.is_cancelled() || !wanted(path) {
                return Extraction::NotWanted;
            }
            match extract_guarded(source, path) {
                Ok(shot) => Extraction::Shot(shot),
                Err(message) => Extraction::Failed(message),
            }
        })
        .collect();

    ctx.check_cancelled()?;
    Ok(extracted)
}

/// Run the extractor, turning a panic into an error message.
pub(crate) fn extract_guarded(source: &dyn MetadataSource, path: &Path) -> Result<ShotRecord, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.extract(path))) {
        Ok(Ok(shot)) => Ok(shot),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(format!("metadata extractor panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
