//! Persisted extension settings.
//!
//! A single string preference: the editor launch command. Read once at
//! startup; a settings UI (out of scope here) writes the same file, so
//! writes go through an atomic rename.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Editor used when no setting is present.
pub const DEFAULT_EDITOR_COMMAND: &str = "code";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Executable invoked with the selected directory as its sole
    /// argument.
    pub editor_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            editor_command: DEFAULT_EDITOR_COMMAND.to_string(),
        }
    }
}

impl Settings {
    /// Per-user settings file location, if a config directory exists.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("open-in-editor").join("settings.json"))
    }

    /// Loads settings from the default location, falling back to
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Loads settings from a specific path; any failure falls back to
    /// defaults (missing settings are not an error).
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(path = %path.display(), "no settings file ({e}); using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "malformed settings ({e}); using defaults");
                Self::default()
            }
        }
    }

    /// Writes settings atomically (write to a sibling temp file, then
    /// rename over the target).
    pub fn store_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
