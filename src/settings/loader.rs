use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::settings::types::Settings;

pub const ENV_DATA_DIR: &str = "BERTH_DATA_DIR";
pub const ENV_INPUT: &str = "BERTH_INPUT";
pub const ENV_WORKSPACE: &str = "BERTH_WORKSPACE";

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Settings validation failed: {message}")]
    ValidationError { message: String },
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Uses `~/.config/berth/config.toml` on Unix, or the platform equivalent
    /// via `dirs::config_dir()`. Falls back to the current directory if no
    /// config directory is available.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("berth").join("config.toml")
    }

    /// Loads settings from the default file and applies environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_from(&Self::config_path())?;
        settings.apply_env_from(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`.
    ///
    /// - If the file doesn't exist, returns `Settings::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::trace!(path = %path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Applies environment overrides, reading variables through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(input) = lookup(ENV_INPUT) {
            self.input = !matches!(input.trim().to_ascii_lowercase().as_str(), "0" | "false");
        }
        if let Some(workspace) = lookup(ENV_WORKSPACE).filter(|v| !v.is_empty()) {
            self.workspace = Some(workspace);
        }
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(SettingsError::ValidationError {
                message: "data_dir must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
