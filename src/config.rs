//! Engine settings (`config.toml`).
//!
//! Settings are owned by the host; the engine only reads them. Missing
//! keys take their defaults, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Default file name for [`EngineConfig::load`].
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Retention limits and playback switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Auto-renamed replays kept before the oldest is deleted. Zero
    /// disables auto-renaming.
    #[serde(default = "default_max_auto_renamed")]
    pub max_auto_renamed_replays: usize,
    /// Deleted replays kept in the deleted folder. Zero deletes immediately.
    #[serde(default = "default_max_deleted")]
    pub max_deleted_replays: usize,
    /// Skip uninteresting pulls when jumping to a chapter.
    #[serde(default = "default_true")]
    pub enable_quick_load: bool,
    /// Allow jumping directly to a clicked time.
    #[serde(default)]
    pub enable_jump_to_time: bool,
    /// Loading speed cap in percent while quick-loading; 100 or less keeps
    /// the client's own limit.
    #[serde(default = "default_max_seek_delta")]
    pub max_seek_delta: f32,
    /// Replay to reload if the engine restarts mid-playback.
    #[serde(default)]
    pub last_loaded_replay: Option<PathBuf>,
}

fn default_max_auto_renamed() -> usize {
    30
}

fn default_max_deleted() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_seek_delta() -> f32 {
    100.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_auto_renamed_replays: default_max_auto_renamed(),
            max_deleted_replays: default_max_deleted(),
            enable_quick_load: true,
            enable_jump_to_time: false,
            max_seek_delta: default_max_seek_delta(),
            last_loaded_replay: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Config` if the text is not valid TOML or a key
    /// has the wrong type.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the configuration at `path`, falling back to defaults if the
    /// file is missing or invalid.
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default configuration");
                return Self::default();
            }
        };

        Self::from_toml(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Writes the configuration to `path` as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::IoError` if the file can't be written, or
    /// `ReplayError::ConfigEncode` if a value has no TOML form.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
