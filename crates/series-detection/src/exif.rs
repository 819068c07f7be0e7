//! EXIF metadata extraction using exiftool for GeoRAW
//!
//! The detector only sees [`ShotRecord`]s; how they are produced is hidden
//! behind [`MetadataSource`]. The production source keeps a small pool of
//! exiftool processes in stay-open mode, one per concurrent caller.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::shot::ShotRecord;

/// Extracts a [`ShotRecord`] from one photo file.
///
/// Implementations must report malformed input as an error rather than
/// aborting the process.
pub trait MetadataSource: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ShotRecord>;
}

/// Deserialize a value that could be a string or number into Option<String>
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;
    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[derive(Deserialize)]
struct ExiftoolOutput {
    #[serde(rename = "SourceFile")]
    source_file: String,
    #[serde(rename = "DateTimeOriginal", deserialize_with = "deserialize_string_or_number", default)]
    date_time_original: Option<String>,
    #[serde(rename = "SubSecTimeOriginal", deserialize_with = "deserialize_string_or_number", default)]
    subsec_time_original: Option<String>,
    #[serde(rename = "CreateDate", deserialize_with = "deserialize_string_or_number", default)]
    create_date: Option<String>,
    #[serde(rename = "ModifyDate", deserialize_with = "deserialize_string_or_number", default)]
    modify_date: Option<String>,
    #[serde(rename = "Make", deserialize_with = "deserialize_string_or_number", default)]
    make: Option<String>,
    #[serde(rename = "Model", deserialize_with = "deserialize_string_or_number", default)]
    model: Option<String>,
    #[serde(rename = "ExposureTime")]
    exposure_time: Option<serde_json::Value>,
    #[serde(rename = "FNumber")]
    f_number: Option<serde_json::Value>,
    #[serde(rename = "ISO")]
    iso: Option<serde_json::Value>,
    /// Canon maker note HDR setting (0 = off)
    #[serde(rename = "HDR")]
    hdr: Option<serde_json::Value>,
}

impl ExiftoolOutput {
    fn into_shot(self) -> Result<ShotRecord> {
        let path = PathBuf::from(&self.source_file);

        let capture_time = parse_capture_time(self.date_time_original.as_deref(), self.subsec_time_original.as_deref())
            .or_else(|| parse_capture_time(self.create_date.as_deref(), None))
            .or_else(|| parse_capture_time(self.modify_date.as_deref(), None))
            .with_context(|| format!("capture time not found in metadata of {}", path.display()))?;

        let mut shot = ShotRecord::new(path, capture_time);
        shot.make = self.make.unwrap_or_default().trim().to_string();
        shot.model = self.model.unwrap_or_default().trim().to_string();
        shot.exposure_time = self.exposure_time.as_ref().and_then(value_as_f64).unwrap_or(0.0).max(0.0);
        shot.f_number = self.f_number.as_ref().and_then(value_as_f64).unwrap_or(0.0).max(0.0);
        shot.iso = self
            .iso
            .as_ref()
            .and_then(value_as_f64)
            .filter(|iso| *iso > 0.0)
            .map(|iso| iso.round() as u32)
            .unwrap_or(0);
        shot.hdr_hint = self.hdr.as_ref().map(hdr_enabled).unwrap_or(false);
        Ok(shot)
    }
}

/// Numeric exiftool value; handles both `-n` numbers and `1/250` style strings.
fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_rational(s),
        _ => None,
    }
}

fn parse_rational(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.parse().ok(),
    }
}

fn hdr_enabled(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => {
            let lower = s.trim().to_lowercase();
            lower.starts_with("on") || lower.parse::<f64>().map(|v| v != 0.0).unwrap_or(false)
        }
        serde_json::Value::Bool(b) => *b,
        _ => false,
    }
}

pub struct ExiftoolRunner {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ExiftoolRunner {
    /// Create a new ExiftoolRunner with a persistent exiftool process
    pub fn new() -> Result<Self> {
        let mut child = Command::new("exiftool")
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn exiftool process. Make sure exiftool is installed and in PATH.")?;

        let stdin = BufWriter::new(
            child.stdin.take()
                .context("Failed to get stdin handle for exiftool process")?
        );

        let stdout = BufReader::new(
            child.stdout.take()
                .context("Failed to get stdout handle for exiftool process")?
        );

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    /// Whether the exiftool process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Extract shot records from multiple image files
    pub fn extract(&mut self, paths: &[PathBuf]) -> Result<Vec<ShotRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        writeln!(self.stdin, "-json")?;
        writeln!(self.stdin, "-n")?;
        writeln!(self.stdin, "-fast")?;  // -fast not -fast2: the HDR flag lives in maker notes
        for tag in [
            "-DateTimeOriginal",
            "-SubSecTimeOriginal",
            "-CreateDate",
            "-ModifyDate",
            "-Make",
            "-Model",
            "-ExposureTime",
            "-FNumber",
            "-ISO",
            "-HDR",
        ] {
            writeln!(self.stdin, "{}", tag)?;
        }

        for path in paths {
            writeln!(self.stdin, "{}", path.display())?;
        }

        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        // Read JSON output until {ready} sentinel
        let mut json_output = String::new();
        loop {
            let mut line = String::new();
            let bytes_read = self.stdout.read_line(&mut line)?;
            if bytes_read == 0 {
                bail!("Unexpected EOF from exiftool process");
            }

            let trimmed = line.trim();
            if trimmed.starts_with("{ready") && trimmed.ends_with('}') {
                break;
            }
            json_output.push_str(&line);
        }

        if json_output.trim().is_empty() {
            bail!("exiftool returned no metadata");
        }

        let exiftool_data: Vec<ExiftoolOutput> = serde_json::from_str(&json_output)
            .with_context(|| {
                let preview: String = json_output.chars().take(500).collect();
                format!("Failed to parse exiftool JSON output. First bytes: {}", preview)
            })?;

        exiftool_data.into_iter().map(ExiftoolOutput::into_shot).collect()
    }

    /// Extract the record of a single file
    pub fn extract_one(&mut self, path: &Path) -> Result<ShotRecord> {
        let mut shots = self.extract(&[path.to_path_buf()])?;
        let mut shot = shots.pop().context("exiftool returned no record")?;
        // Keep the caller's spelling of the path rather than exiftool's
        shot.path = path.to_path_buf();
        Ok(shot)
    }
}

impl Drop for ExiftoolRunner {
    fn drop(&mut self) {
        // Gracefully shut down exiftool
        let _ = writeln!(self.stdin, "-stay_open");
        let _ = writeln!(self.stdin, "False");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

/// [`MetadataSource`] backed by a pool of stay-open exiftool processes.
///
/// A runner is checked out per call and returned afterwards, so the pool never
/// grows beyond the number of concurrent callers.
#[derive(Default)]
pub struct ExiftoolSource {
    idle: Mutex<Vec<ExiftoolRunner>>,
}

impl ExiftoolSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataSource for ExiftoolSource {
    fn extract(&self, path: &Path) -> Result<ShotRecord> {
        let pooled = self.idle.lock().pop();
        let mut runner = match pooled {
            Some(runner) => runner,
            None => {
                debug!("spawning exiftool runner");
                ExiftoolRunner::new()?
            }
        };

        let result = runner.extract_one(path);
        if runner.is_alive() {
            self.idle.lock().push(runner);
        }
        result
    }
}

/// Parse capture time with subsecond precision
fn parse_capture_time(date_time_original: Option<&str>, subsec_time_original: Option<&str>) -> Option<DateTime<Utc>> {
    let date_str = date_time_original?.trim();
    // Drop any trailing zone designator, e.g. "2024:01:15 14:30:25+02:00"
    let date_str = date_str.get(..19).unwrap_or(date_str);

    let naive_dt = NaiveDateTime::parse_from_str(date_str, "%Y:%m:%d %H:%M:%S").ok()?;

    let dt_with_subsec = match subsec_time_original.map(str::trim) {
        Some(subsec) if !subsec.is_empty() && subsec.len() <= 9 => match subsec.parse::<u32>() {
            Ok(subsec_num) => {
                // Subsec is typically 2-3 digits representing fractional seconds
                let subsec_nanos = subsec_num * 10u32.pow(9 - subsec.len() as u32);
                naive_dt.with_nanosecond(subsec_nanos).unwrap_or(naive_dt)
            }
            Err(_) => naive_dt,
        },
        _ => naive_dt,
    };

    Some(DateTime::from_naive_utc_and_offset(dt_with_subsec, Utc))
}
