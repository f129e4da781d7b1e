use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory, relative to the working directory, holding the backend
    /// record and the selected workspace (default: `.berth`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Whether interactive prompts are allowed (default: true).
    #[serde(default = "default_input")]
    pub input: bool,
    /// Copy state during migration without asking for confirmation.
    #[serde(default)]
    pub force_copy: bool,
    #[serde(default)]
    pub lock: LockSettings,
    /// Workspace override, usually from `BERTH_WORKSPACE`. Not read from file.
    #[serde(skip)]
    pub workspace: Option<String>,
}

/// Advisory lock on the backend record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Lock the record while a transition rewrites it (default: true).
    #[serde(default = "default_lock_enabled")]
    pub enabled: bool,
    /// How long to wait for the lock; 0 makes a single attempt.
    #[serde(default)]
    pub timeout_seconds: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".berth")
}

fn default_input() -> bool {
    true
}

fn default_lock_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            input: default_input(),
            force_copy: false,
            lock: LockSettings::default(),
            workspace: None,
        }
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: default_lock_enabled(),
            timeout_seconds: 0,
        }
    }
}
