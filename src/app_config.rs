use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language code of the subtitles rendered on top
    #[serde(default = "default_upper_language")]
    pub upper_language: String,

    /// Language code of the subtitles rendered below
    #[serde(default = "default_lower_language")]
    pub lower_language: String,

    /// Merge behaviour
    #[serde(default)]
    pub merge: MergeConfig,

    /// External media tools
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Temporary storage and external file handling
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Where merged subtitles end up
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Write a `.srt` file next to the video
    #[default]
    Sibling,
    /// Append a subtitle stream to the video container
    Inject,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sibling => write!(f, "sibling"),
            Self::Inject => write!(f, "inject"),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sibling" => Ok(Self::Sibling),
            "inject" => Ok(Self::Inject),
            _ => Err(anyhow!("Invalid output mode: {}", s)),
        }
    }
}

/// Merge settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MergeConfig {
    /// Strip styling markers from the merged text
    #[serde(default)]
    pub plain_text: bool,

    /// Sibling file or container injection
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Optional font color applied to upper lines, e.g. "#ffff54"
    #[serde(default)]
    pub upper_color: Option<String>,

    /// Mark an injected stream as default and clear the flag on the others
    #[serde(default = "default_true")]
    pub make_default: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            plain_text: false,
            output_mode: OutputMode::default(),
            upper_color: None,
            make_default: true,
        }
    }
}

/// Media tool settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolsConfig {
    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// ffprobe executable
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Timeout for a single tool invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Temporary storage settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory for temporary containers; the system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Minimum free space in the temp dir, in megabytes
    #[serde(default = "default_min_free_space_mb")]
    pub min_free_space_mb: u64,

    /// Declared encoding of external subtitle files
    #[serde(default = "default_external_encoding")]
    pub external_encoding: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            min_free_space_mb: default_min_free_space_mb(),
            external_encoding: default_external_encoding(),
        }
    }
}

impl StorageConfig {
    /// Temp directory to use for injection
    pub fn effective_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Safety margin in bytes
    pub fn min_free_space_bytes(&self) -> u64 {
        self.min_free_space_mb.saturating_mul(1024 * 1024)
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_upper_language() -> String {
    "en".to_string()
}

fn default_lower_language() -> String {
    "ru".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_min_free_space_mb() -> u64 {
    500
}

fn default_external_encoding() -> String {
    "utf-8".to_string()
}

impl Config {
    /// Load a config file, creating it with defaults when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            return serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()));
        }

        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::file_utils::FileManager::ensure_dir(parent)?;
        }
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::get_language_name(&self.upper_language)
            .context("Invalid upper language")?;
        crate::language_utils::get_language_name(&self.lower_language)
            .context("Invalid lower language")?;

        if crate::language_utils::language_codes_match(&self.upper_language, &self.lower_language) {
            return Err(anyhow!(
                "Upper and lower languages must differ (both are '{}')",
                self.upper_language
            ));
        }

        if encoding_rs::Encoding::for_label(self.storage.external_encoding.trim().as_bytes()).is_none() {
            return Err(anyhow!("Unknown encoding: {}", self.storage.external_encoding));
        }

        if let Some(color) = &self.merge.upper_color {
            if !crate::merging::is_valid_color(color) {
                return Err(anyhow!("Invalid upper color: {:?}", color));
            }
        }

        if self.tools.timeout_secs == 0 {
            return Err(anyhow!("Tool timeout must be greater than zero"));
        }

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            upper_language: default_upper_language(),
            lower_language: default_lower_language(),
            merge: MergeConfig::default(),
            tools: ToolsConfig::default(),
            storage: StorageConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
