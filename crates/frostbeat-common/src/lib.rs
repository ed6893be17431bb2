//! Common configuration and helpers shared across Frostbeat crates

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Convert an author-supplied duration in seconds to whole milliseconds.
/// Negative and NaN values clamp to zero.
pub fn secs_to_ms(secs: f32) -> u32 {
    if secs.is_nan() || secs <= 0.0 {
        return 0;
    }
    (secs * 1000.0).round() as u32
}

/// Timing constants for transitions and narration scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Length of each half of the screen fade (out, then in)
    pub fade_ms: u32,
    /// Silence inserted between two consecutive narration clips
    pub clip_gap_ms: u32,
    /// How long a clip requested before the audio unlock is held
    pub unlock_retry_ms: u32,
    /// Buffer added after a clue narration before its tutorial plays
    pub tutorial_buffer_ms: u32,
    /// Buffer between the intro narration and the ambient scene narration
    pub intro_buffer_ms: u32,
    /// Fallback clip length when a narration has no declared duration
    pub default_clip_secs: f32,
    /// Per-batch asset load timeout. None waits forever.
    pub load_timeout_ms: Option<u64>,
}

impl Timings {
    pub fn default_clip_ms(&self) -> u32 {
        secs_to_ms(self.default_clip_secs)
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fade_ms: 1500,
            clip_gap_ms: 100,
            unlock_retry_ms: 100,
            tutorial_buffer_ms: 1000,
            intro_buffer_ms: 2000,
            default_clip_secs: 3.0,
            load_timeout_ms: None,
        }
    }
}

/// Audio output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// Master volume (0.0 – 1.0)
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 1.0,
        }
    }
}

/// Application-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Root directory that audio and texture references resolve against
    pub assets_dir: PathBuf,
    /// Alternative scene table (JSON). None uses the built-in table.
    pub scenes_file: Option<PathBuf>,
    pub audio: AudioConfig,
    pub timings: Timings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            assets_dir: std::env::current_dir()
                .unwrap_or_default()
                .join("assets"),
            scenes_file: None,
            audio: AudioConfig::default(),
            timings: Timings::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        Ok(config.normalized())
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn normalized(mut self) -> Self {
        self.audio.volume = if self.audio.volume.is_nan() {
            1.0
        } else {
            self.audio.volume.clamp(0.0, 1.0)
        };
        if self.timings.default_clip_secs.is_nan() || self.timings.default_clip_secs < 0.0 {
            self.timings.default_clip_secs = Timings::default().default_clip_secs;
        }
        self
    }
}
