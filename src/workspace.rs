//! The currently selected workspace and the check run after `init`.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::{Backend, WorkspaceError, DEFAULT_WORKSPACE};
use crate::record::write_atomic;
use crate::ui::{Prompt, Ui, UiError};

/// File inside the data directory holding the selected workspace name.
pub const ENVIRONMENT_FILENAME: &str = "environment";

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Invalid workspace name {name:?}: names may only contain letters, digits, '-', '_' and '.'")]
    InvalidName { name: String },

    #[error("Failed to read selected workspace '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to save selected workspace '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to get existing workspaces: {0}")]
    List(#[source] WorkspaceError),

    #[error("No existing workspaces.\n\nCreate and select a new workspace. If the backend already contains existing workspaces, you may need to update the backend configuration.")]
    NoWorkspaces,

    #[error("Failed to select workspace: input not a valid number")]
    InvalidChoice,

    #[error("Failed to select workspace: {0}")]
    Prompt(#[from] UiError),
}

/// Where the selected workspace is remembered.
#[derive(Debug, Clone)]
pub struct WorkspaceSelection {
    data_dir: PathBuf,
    env_override: Option<String>,
}

impl WorkspaceSelection {
    /// `env_override`, when set, takes precedence over the saved selection.
    pub fn new(data_dir: impl Into<PathBuf>, env_override: Option<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            env_override,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(ENVIRONMENT_FILENAME)
    }

    /// The selected workspace, `default` if none was ever selected.
    pub fn current(&self) -> Result<String, SelectionError> {
        if let Some(name) = &self.env_override {
            validate_name(name)?;
            return Ok(name.clone());
        }

        let path = self.path();
        match fs::read_to_string(&path) {
            Ok(content) => {
                let name = content.trim();
                if name.is_empty() {
                    return Ok(DEFAULT_WORKSPACE.to_string());
                }
                validate_name(name)?;
                Ok(name.to_string())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DEFAULT_WORKSPACE.to_string()),
            Err(source) => Err(SelectionError::Read { path, source }),
        }
    }

    /// Persist `name` as the selected workspace.
    pub fn select(&self, name: &str) -> Result<(), SelectionError> {
        validate_name(name)?;
        let path = self.path();
        write_atomic(&path, name.as_bytes()).map_err(|source| SelectionError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(workspace = %name, "Selected workspace");
        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<(), SelectionError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SelectionError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Make sure the selected workspace exists in `backend`.
///
/// A backend without workspaces needs nothing. If the selected workspace is
/// missing and the backend has exactly one, that one is selected; otherwise
/// the operator picks from a numbered list.
pub fn select_workspace(
    backend: &dyn Backend,
    selection: &WorkspaceSelection,
    ui: &mut dyn Ui,
) -> Result<(), SelectionError> {
    let workspaces = match backend.workspaces() {
        Ok(names) => names,
        Err(WorkspaceError::NotSupported) => return Ok(()),
        Err(e) => return Err(SelectionError::List(e)),
    };
    if workspaces.is_empty() {
        return Err(SelectionError::NoWorkspaces);
    }

    let current = selection.current()?;
    if workspaces.iter().any(|w| *w == current) {
        tracing::trace!(workspace = %current, "Selected workspace is present in the backend");
        return Ok(());
    }

    if let [only] = workspaces.as_slice() {
        tracing::trace!(workspace = %only, "Automatically selecting the backend's single workspace");
        return selection.select(only);
    }

    let mut list = String::new();
    for (i, name) in workspaces.iter().enumerate() {
        let _ = writeln!(list, "{}. {}", i + 1, name);
    }
    let answer = ui.input(&Prompt::new(
        "select-workspace",
        format!("\nThe currently selected workspace ({}) does not exist.", current),
        format!(
            "This is expected behavior when the selected workspace did not have an\nexisting non-empty state. Please enter a number to select a workspace:\n\n{}",
            list
        ),
    ))?;

    let idx: usize = answer.trim().parse().map_err(|_| SelectionError::InvalidChoice)?;
    let chosen = idx
        .checked_sub(1)
        .and_then(|i| workspaces.get(i))
        .ok_or(SelectionError::InvalidChoice)?;
    tracing::trace!(workspace = %chosen, "Selecting workspace chosen by the operator");
    selection.select(chosen)
}

/// Resolve the data directory against the working directory.
pub fn data_dir_in(working_dir: &Path, data_dir: &Path) -> PathBuf {
    if data_dir.is_absolute() {
        data_dir.to_path_buf()
    } else {
        working_dir.join(data_dir)
    }
}
