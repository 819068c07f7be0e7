//! Per-run outcome bookkeeping

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Processed,
    Unchanged,
    Skipped,
    OutOfTrack,
    MetaError,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl FileResult {
    pub fn new(path: impl Into<PathBuf>, status: FileStatus, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status,
            message: message.into(),
        }
    }
}

/// Counts per status plus one record per file, in the order files were settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub out_of_track: usize,
    pub failed: usize,
    pub meta_errors: usize,
    pub files: Vec<FileResult>,
}

impl RunSummary {
    pub fn record(&mut self, result: FileResult) {
        match result.status {
            FileStatus::Processed => self.processed += 1,
            FileStatus::Unchanged => self.unchanged += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::OutOfTrack => self.out_of_track += 1,
            FileStatus::MetaError => self.meta_errors += 1,
            FileStatus::Failed => self.failed += 1,
        }
        self.files.push(result);
    }

    /// Result recorded for `path`, if any.
    pub fn result_for(&self, path: &Path) -> Option<&FileResult> {
        self.files.iter().find(|r| r.path == path)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write output to {}", path.display()))?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finished. processed={} skipped={} unchanged={} out_of_track={} failed={} meta_errors={}",
            self.processed, self.skipped, self.unchanged, self.out_of_track, self.failed, self.meta_errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_counts_and_display() {
        let mut summary = RunSummary::default();
        summary.record(FileResult::new("a.cr3", FileStatus::Processed, "a.xmp"));
        summary.record(FileResult::new("b.cr3", FileStatus::OutOfTrack, ""));
        summary.record(FileResult::new("c.txt", FileStatus::Skipped, "Not a RAW file"));
        summary.record(FileResult::new("d.cr3", FileStatus::MetaError, "boom"));

        assert_eq!(
            summary.to_string(),
            "Finished. processed=1 skipped=1 unchanged=0 out_of_track=1 failed=0 meta_errors=1"
        );
        assert_eq!(summary.files.len(), 4);
        assert_eq!(
            summary.result_for(Path::new("d.cr3")).map(|r| r.message.as_str()),
            Some("boom")
        );
    }

    #[test]
    fn test_json_shape() {
        let mut summary = RunSummary::default();
        summary.record(FileResult::new("a.cr3", FileStatus::MetaError, "bad exif"));
        summary.record(FileResult::new("b.cr3", FileStatus::OutOfTrack, ""));

        let dir = tempdir().unwrap();
        let out = dir.path().join("summary.json");
        summary.write_json(&out).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(value["meta_errors"], 1);
        assert_eq!(value["files"][0]["status"], "meta_error");
        assert_eq!(value["files"][1]["status"], "out_of_track");
        assert!(value["files"][1].get("message").is_none());
    }
}
