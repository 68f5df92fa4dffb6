//! Game configuration

use engine::config::{Config, ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Game configuration, loaded from `game.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Engine settings
    pub engine: EngineConfig,
    /// Demo scene settings
    pub scene: SceneConfig,
}

impl Config for GameConfig {}

/// Demo scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Side length of the stone floor in blocks
    pub floor_size: u32,
    /// Frames to run before exiting
    pub frames: u64,
    /// Fixed frame delta in seconds; 0 uses the wall clock
    pub frame_delta: f32,
    /// Attach the demo scripts
    pub scripts: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            floor_size: 10,
            frames: 300,
            frame_delta: 1.0 / 60.0,
            scripts: true,
        }
    }
}

impl GameConfig {
    /// Load `path`, or defaults when it does not exist, then validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.engine.validate()?;
        if config.scene.floor_size == 0 {
            return Err(ConfigError::Invalid {
                field: "scene.floor_size",
                reason: "the floor needs at least one block".into(),
            });
        }
        Ok(config)
    }

    /// Asset root, falling back to the crate's bundled assets
    pub fn asset_root(&self) -> PathBuf {
        let configured = PathBuf::from(&self.engine.assets.root);
        if configured.is_absolute() || configured.exists() {
            return configured;
        }
        Path::new(env!("CARGO_MANIFEST_DIR")).join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GameConfig::load(dir.path().join("game.toml")).unwrap();
        assert_eq!(config, GameConfig::default());
    }

    #[test]
    fn test_partial_file_overrides_only_named_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.toml");
        std::fs::write(&path, "[scene]\nframes = 12\n\n[engine.scripting]\nmax_instructions = 5000\n").unwrap();

        let config = GameConfig::load(&path).unwrap();
        assert_eq!(config.scene.frames, 12);
        assert_eq!(config.scene.floor_size, 10);
        assert_eq!(config.engine.scripting.max_instructions, 5000);
        assert_eq!(config.engine.scripting.update_callback, "on_update");
    }

    #[test]
    fn test_zero_floor_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.ron");
        std::fs::write(&path, "(scene: (floor_size: 0))").unwrap();
        assert!(matches!(
            GameConfig::load(&path),
            Err(ConfigError::Invalid { field: "scene.floor_size", .. })
        ));
    }

    #[test]
    fn test_bundled_assets_found() {
        let root = GameConfig::default().asset_root();
        assert!(root.join("scripts/spin.lua").exists());
    }
}
