//! Configuration system
//!
//! Every section has serde defaults, so a config file only needs to name the
//! values it overrides.

pub use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Load from file, falling back to defaults if the file does not exist
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log output
    pub logging: LoggingConfig,
    /// Script bridge limits
    pub scripting: ScriptingConfig,
    /// Render pipeline
    pub render: RenderConfig,
    /// Frame clock
    pub timing: TimingConfig,
    /// Resource loading
    pub assets: AssetConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scripting.update_callback.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "scripting.update_callback",
                reason: "must name a function".into(),
            });
        }
        if self.scripting.max_instructions == 0 {
            return Err(ConfigError::Invalid {
                field: "scripting.max_instructions",
                reason: "must be positive".into(),
            });
        }
        if self.scripting.max_string_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "scripting.max_string_bytes",
                reason: "must be positive".into(),
            });
        }
        if self.render.frames_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "render.frames_in_flight",
                reason: "need at least one draw list".into(),
            });
        }
        if !(self.timing.max_delta > 0.0) {
            return Err(ConfigError::Invalid {
                field: "timing.max_delta",
                reason: format!("{} is not a positive duration", self.timing.max_delta),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

/// Script bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Per-frame callback every script must define
    pub update_callback: String,
    /// VM instructions one invocation may execute
    pub max_instructions: u64,
    /// Instructions between budget checks
    pub hook_interval: u32,
    /// Optional wall-clock limit per invocation, in milliseconds
    pub max_wall_time_ms: Option<u64>,
    /// How many faults the bridge remembers
    pub fault_history: usize,
    /// Heap the Lua state may hold across all scripts, in bytes; 0 is unlimited
    pub max_memory_bytes: usize,
    /// Largest string `string.rep` may build, in bytes
    pub max_string_bytes: usize,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            update_callback: "on_update".into(),
            max_instructions: 1_000_000,
            hook_interval: 1_000,
            max_wall_time_ms: Some(250),
            fault_history: 32,
            max_memory_bytes: 64 * 1024 * 1024,
            max_string_bytes: 1024 * 1024,
        }
    }
}

/// Render pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Draw lists cycled between frames
    pub frames_in_flight: usize,
    /// Upper bound on commands per frame; the rest are dropped with a warning
    pub max_draw_commands: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            max_draw_commands: 65_536,
        }
    }
}

/// Frame clock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Longest frame delta handed to scripts, in seconds
    pub max_delta: f32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { max_delta: 0.1 }
    }
}

/// Resource loading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory asset paths are resolved against
    pub root: String,
    /// Completions installed per frame at most
    pub max_completions_per_frame: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: "assets".into(),
            max_completions_per_frame: 64,
        }
    }
}
