//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use series_detection::{SeriesConfig, SeriesMode};
use track_index::OffsetEstimator;

use crate::series::{DEFAULT_FOCUS_TAG, DEFAULT_HDR_TAG, DEFAULT_MAKE_FAMILY};

/// Application configuration.
///
/// Command-line flags override whatever is loaded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub offset: OffsetEstimator,
    pub series: SeriesConfig,
    pub tagging: TaggingConfig,
}

/// Defaults for the `series` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub mode: SeriesMode,
    pub hdr_tag: String,
    pub focus_tag: String,
    pub make_family: String,
    pub extra_tags: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            offset: OffsetEstimator::default(),
            series: SeriesConfig::default(),
            tagging: TaggingConfig::default(),
        }
    }
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            mode: SeriesMode::Auto,
            hdr_tag: DEFAULT_HDR_TAG.to_string(),
            focus_tag: DEFAULT_FOCUS_TAG.to_string(),
            make_family: DEFAULT_MAKE_FAMILY.to_string(),
            extra_tags: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, the user config file, `config_path`,
    /// then `GEORAW_*` environment variables (`__` separates nested keys,
    /// e.g. `GEORAW_SERIES__MIN_SERIES_LEN=4`).
    #[allow(clippy::result_large_err)]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("GEORAW_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for georaw.
///
/// On Linux: `~/.config/georaw`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("georaw"))
}
