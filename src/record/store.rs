use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::write_atomic;
use crate::backend::{ConfigSchema, ConfigValue, DecodeError};
use crate::config::Fingerprint;

/// File name of the record inside the data directory.
pub const RECORD_FILENAME: &str = "backend.json";

/// Format version written into the record.
pub const RECORD_VERSION: u32 = 3;

/// Errors reading or writing the cached record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to read backend record '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse backend record '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write backend record '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode backend record: {0}")]
    EncodeError(#[from] serde_json::Error),
}

/// The backend a working directory was last initialized with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBackend {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Decoded configuration, interpreted through the backend's schema.
    pub config: Value,
    /// Fingerprint of the declared configuration at the time of writing.
    pub hash: Fingerprint,
}

impl CachedBackend {
    pub fn new(type_name: impl Into<String>, config: Value, hash: Fingerprint) -> Self {
        Self {
            type_name: type_name.into(),
            config,
            hash,
        }
    }

    /// Stand-in record for a working directory with no backend configured.
    /// Never persisted.
    pub fn synthetic_local() -> Self {
        Self::new("local", Value::Object(Default::default()), Fingerprint::ZERO)
    }

    /// A cleared record has no type.
    pub fn is_empty(&self) -> bool {
        self.type_name.is_empty()
    }

    /// Decode the saved configuration against `schema`.
    pub fn config(&self, schema: &ConfigSchema) -> Result<ConfigValue, DecodeError> {
        schema.decode_raw(&self.config)
    }
}

/// Everything persisted in the record file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<CachedBackend>,
    /// Legacy remote state settings. Never written by this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Value>,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl WorkingState {
    pub fn new() -> Self {
        Self {
            version: RECORD_VERSION,
            backend: None,
            remote: None,
        }
    }

    /// The cached backend, if present and not cleared.
    pub fn backend(&self) -> Option<&CachedBackend> {
        self.backend.as_ref().filter(|b| !b.is_empty())
    }

    /// Whether the record still carries legacy remote state settings.
    ///
    /// A remote section only counts when it names a type.
    pub fn has_legacy_remote(&self) -> bool {
        self.remote
            .as_ref()
            .and_then(|remote| remote.get("type"))
            .and_then(Value::as_str)
            .map_or(false, |type_name| !type_name.is_empty())
    }
}

impl Default for WorkingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and writes the record at one fixed path.
///
/// `state()` always returns a value; before the first refresh, or when the
/// file does not exist, it is an empty [`WorkingState`].
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    state: WorkingState,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: WorkingState::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record from disk. A missing file yields an empty state.
    pub fn refresh_state(&mut self) -> Result<(), RecordError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::trace!(path = %self.path.display(), "No backend record on disk");
                self.state = WorkingState::new();
                return Ok(());
            }
            Err(source) => {
                return Err(RecordError::ReadError {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            self.state = WorkingState::new();
            return Ok(());
        }

        self.state = serde_json::from_str(&content).map_err(|source| RecordError::ParseError {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn state(&self) -> &WorkingState {
        &self.state
    }

    /// Replace the in-memory record. Nothing touches disk until
    /// [`RecordStore::persist_state`].
    pub fn write_state(&mut self, state: WorkingState) {
        self.state = state;
    }

    /// Flush the in-memory record to disk as a whole-file replacement.
    pub fn persist_state(&mut self) -> Result<(), RecordError> {
        let mut bytes = serde_json::to_vec_pretty(&self.state)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).map_err(|source| RecordError::WriteError {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(
            path = %self.path.display(),
            backend_type = self.state.backend().map(|b| b.type_name.as_str()).unwrap_or(""),
            "Persisted backend record"
        );
        Ok(())
    }
}
