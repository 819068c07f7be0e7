//! Input resolution
//!
//! An input string holds one or more entries separated by `;` or newlines. Each
//! entry is a file, a directory or a glob pattern. Results keep first-seen
//! order with duplicates removed.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Camera RAW formats accepted by both workflows.
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "cr3", "dng", "erf", "kdc", "mrw", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2", "rwl",
    "sr2", "srf", "srw", "x3f",
];

/// In-camera merged outputs that can hint at an HDR bracket.
pub const MERGED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "hif"];

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("input path is empty")]
    EmptyInput,
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("no files matched pattern {0:?}")]
    NoMatch(String),
    #[error("stat {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read dir {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Resolve `input` into the list of files to process.
pub fn collect_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>, CollectError> {
    let entries = split_inputs(input);
    if entries.is_empty() {
        return Err(CollectError::EmptyInput);
    }

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut add = |path: PathBuf| {
        if seen.insert(path.clone()) {
            files.push(path);
        }
    };

    for entry in entries {
        for candidate in expand_entry(entry)? {
            let meta = fs::metadata(&candidate).map_err(|source| CollectError::Io {
                path: candidate.clone(),
                source,
            })?;
            if meta.is_dir() {
                for file in walk_dir(&candidate, recursive)? {
                    add(file);
                }
            } else {
                add(candidate);
            }
        }
    }

    debug!("collected {} files", files.len());
    Ok(files)
}

fn split_inputs(raw: &str) -> Vec<&str> {
    raw.split(|c| c == ';' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn expand_entry(entry: &str) -> Result<Vec<PathBuf>, CollectError> {
    if !entry.contains(['*', '?', '[']) {
        return Ok(vec![PathBuf::from(entry)]);
    }

    let paths = glob::glob(entry).map_err(|source| CollectError::Pattern {
        pattern: entry.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for result in paths {
        match result {
            Ok(path) => matches.push(path),
            Err(err) => {
                let path = err.path().to_path_buf();
                return Err(CollectError::Io {
                    path,
                    source: err.into_error(),
                });
            }
        }
    }
    if matches.is_empty() {
        return Err(CollectError::NoMatch(entry.to_string()));
    }
    Ok(matches)
}

fn walk_dir(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, CollectError> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| CollectError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, list: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| list.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

pub fn is_sidecar(path: &Path) -> bool {
    has_extension(path, &["xmp"])
}

pub fn is_raw(path: &Path) -> bool {
    has_extension(path, RAW_EXTENSIONS)
}

pub fn is_merged_candidate(path: &Path) -> bool {
    has_extension(path, MERGED_EXTENSIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_split_inputs() {
        assert_eq!(split_inputs(" a ; b\nc\r\n;; "), vec!["a", "b", "c"]);
        assert!(split_inputs("  ;\n").is_empty());
    }

    #[test]
    fn test_extensions() {
        assert!(is_raw(Path::new("IMG_0001.CR3")));
        assert!(is_raw(Path::new("dsc.nef")));
        assert!(!is_raw(Path::new("IMG_0001.JPG")));
        assert!(is_merged_candidate(Path::new("IMG_0001.HIF")));
        assert!(is_sidecar(Path::new("IMG_0001.XMP")));
        assert!(!is_raw(Path::new("README")));
    }

    #[test]
    fn test_directory_depth() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.cr3"));
        touch(&dir.path().join("a.cr3"));
        touch(&dir.path().join("sub/c.cr3"));
        let input = dir.path().to_str().unwrap();

        let flat = collect_files(input, false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.cr3"), dir.path().join("b.cr3")]);

        let deep = collect_files(input, true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("sub/c.cr3")));
    }

    #[test]
    fn test_multiple_specs_are_deduplicated() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.cr3");
        let b = dir.path().join("b.nef");
        touch(&a);
        touch(&b);

        let input = format!(
            "{};{}\n{}",
            a.display(),
            dir.path().join("*.cr3").display(),
            dir.path().display()
        );
        let files = collect_files(&input, false).unwrap();
        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn test_glob_without_match_is_an_error() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("*.cr3");
        let err = collect_files(pattern.to_str().unwrap(), false).unwrap_err();
        assert!(matches!(err, CollectError::NoMatch(_)));
    }

    #[test]
    fn test_missing_path_and_empty_input() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.cr3");
        assert!(matches!(
            collect_files(missing.to_str().unwrap(), false),
            Err(CollectError::Io { .. })
        ));
        assert!(matches!(collect_files("  ", false), Err(CollectError::EmptyInput)));
    }
}
