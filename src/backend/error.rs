//! Error types shared by backend implementations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from listing the workspaces of a backend.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The backend has a single implicit workspace.
    #[error("workspaces not supported")]
    NotSupported,

    #[error("Failed to list workspaces in '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Errors from reading or writing a workspace state snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Error returned by a backend's CLI initialization hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CliInitError {
    pub message: String,
}

/// Errors from running an operation on an enhanced backend.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("workspace \"{workspace}\" has no state")]
    NoState { workspace: String },
}
