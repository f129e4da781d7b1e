//! Filesystem state backend and local operation runner.
//!
//! `LocalBackend` keeps each workspace's snapshot in a JSON file under the
//! working directory. It is also the execution adapter used for backends that
//! only store state: in that case it is built with a state backend and
//! delegates every storage call to it while running operations itself.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::error::{CliInitError, OperationError, StateError, WorkspaceError};
use super::operation::{Operation, OperationKind, OperationOutcome};
use super::schema::{Attribute, AttributeKind, ConfigSchema, ConfigValue};
use super::snapshot::Snapshot;
use super::{Backend, CliInit, CliOpts, Enhanced, LocalPaths, StateManager, DEFAULT_WORKSPACE};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::record::write_atomic;

/// State file for the default workspace.
pub const DEFAULT_STATE_FILENAME: &str = "berth.tfstate";
/// Directory holding one subdirectory per non-default workspace.
pub const DEFAULT_WORKSPACE_DIR: &str = "berth.tfstate.d";
/// Suffix appended to a state file to form its backup path.
pub const DEFAULT_BACKUP_EXTENSION: &str = ".backup";

pub struct LocalBackend {
    working_dir: PathBuf,
    state_path: PathBuf,
    state_out_path: Option<PathBuf>,
    backup_path: Option<PathBuf>,
    workspace_dir: PathBuf,
    /// Storage delegate when acting as the execution adapter.
    state_backend: Option<Box<dyn Backend>>,
}

impl LocalBackend {
    /// A purely local backend rooted at `working_dir`.
    pub fn new(working_dir: &Path) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            state_path: PathBuf::from(DEFAULT_STATE_FILENAME),
            state_out_path: None,
            backup_path: None,
            workspace_dir: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            state_backend: None,
        }
    }

    /// A local runner that stores state in `state_backend`, or in local files
    /// when `None`.
    pub fn with_state_backend(working_dir: &Path, state_backend: Option<Box<dyn Backend>>) -> Self {
        Self {
            state_backend,
            ..Self::new(working_dir)
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    fn workspace_root(&self) -> PathBuf {
        self.resolve(&self.workspace_dir)
    }

    /// Read path, write path and backup path for a workspace's state file.
    fn state_files(&self, workspace: &str) -> (PathBuf, PathBuf, Option<PathBuf>) {
        let (read, write) = if workspace == DEFAULT_WORKSPACE {
            let read = self.resolve(&self.state_path);
            let write = self
                .state_out_path
                .as_deref()
                .map(|p| self.resolve(p))
                .unwrap_or_else(|| read.clone());
            (read, write)
        } else {
            let path = self.workspace_root().join(workspace).join(DEFAULT_STATE_FILENAME);
            (path.clone(), path)
        };

        let backup = match &self.backup_path {
            Some(p) if p.as_os_str() == "-" => None,
            Some(p) if workspace == DEFAULT_WORKSPACE => Some(self.resolve(p)),
            _ => {
                let mut name = write.clone().into_os_string();
                name.push(DEFAULT_BACKUP_EXTENSION);
                Some(PathBuf::from(name))
            }
        };

        (read, write, backup)
    }

    fn local_workspaces(&self) -> Result<Vec<String>, WorkspaceError> {
        let root = self.workspace_root();
        let mut names = vec![DEFAULT_WORKSPACE.to_string()];

        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(source) => return Err(WorkspaceError::Io { path: root, source }),
        };

        let mut others = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WorkspaceError::Io {
                path: root.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name != DEFAULT_WORKSPACE {
                    others.push(name.to_string());
                }
            }
        }
        others.sort();
        names.extend(others);
        Ok(names)
    }
}

impl Backend for LocalBackend {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            Attribute::optional("path", AttributeKind::String)
                .describe("Path to the default workspace's state file"),
            Attribute::optional("workspace_dir", AttributeKind::String)
                .describe("Directory holding non-default workspace states"),
        ])
    }

    fn prepare_config(&mut self, config: ConfigValue) -> (ConfigValue, Diagnostics) {
        let mut diags = Diagnostics::new();
        for (name, summary) in [
            ("path", "Invalid local state file path"),
            ("workspace_dir", "Invalid local workspace directory path"),
        ] {
            if config.get_str(name).map_or(false, str::is_empty) {
                diags.push(Diagnostic::error(
                    DiagnosticKind::Config,
                    summary,
                    format!("The \"{}\" attribute value must not be empty.", name),
                ));
            }
        }
        (config, diags)
    }

    fn configure(&mut self, config: &ConfigValue) -> Diagnostics {
        if let Some(path) = config.get_str("path") {
            self.state_path = PathBuf::from(path);
        }
        if let Some(dir) = config.get_str("workspace_dir") {
            self.workspace_dir = PathBuf::from(dir);
        }
        Diagnostics::new()
    }

    fn workspaces(&self) -> Result<Vec<String>, WorkspaceError> {
        match &self.state_backend {
            Some(backend) => backend.workspaces(),
            None => self.local_workspaces(),
        }
    }

    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, StateError> {
        if let Some(backend) = &self.state_backend {
            return backend.state_mgr(workspace);
        }
        let (read, write, backup) = self.state_files(workspace);
        Ok(Box::new(
            LocalStateManager::new(read)
                .with_out_path(write)
                .with_backup(backup),
        ))
    }

    fn local_paths(&self) -> Option<LocalPaths> {
        if let Some(backend) = &self.state_backend {
            return backend.local_paths();
        }
        let (state_path, state_out_path, _) = self.state_files(DEFAULT_WORKSPACE);
        Some(LocalPaths {
            state_path,
            state_out_path,
            workspace_dir: self.workspace_root(),
        })
    }

    fn as_cli_init(&mut self) -> Option<&mut dyn CliInit> {
        Some(self)
    }

    fn into_enhanced(self: Box<Self>) -> Result<Box<dyn Enhanced>, Box<dyn Backend>> {
        Ok(self)
    }
}

impl CliInit for LocalBackend {
    fn cli_init(&mut self, opts: &CliOpts) -> Result<(), CliInitError> {
        // Path overrides only apply when the state lives in local files.
        if self.state_backend.is_none() {
            if let Some(path) = &opts.state_path {
                self.state_path = path.clone();
            }
            if let Some(path) = &opts.state_out_path {
                self.state_out_path = Some(path.clone());
            }
            if let Some(path) = &opts.backup_path {
                self.backup_path = Some(path.clone());
            }
        }
        tracing::trace!(
            state_path = %self.state_path.display(),
            delegated = self.state_backend.is_some(),
            "Local backend initialized"
        );
        Ok(())
    }
}

impl Enhanced for LocalBackend {
    fn operation(&self, op: Operation) -> Result<OperationOutcome, OperationError> {
        let mut mgr = self.state_mgr(&op.workspace)?;
        mgr.refresh_state()?;

        match op.kind {
            OperationKind::Show => Ok(OperationOutcome {
                state: mgr.state().cloned(),
                workspace: op.workspace,
            }),
            OperationKind::Replace(mut next) => {
                match mgr.state() {
                    Some(current) => {
                        next.serial = current.serial + 1;
                        next.lineage = current.lineage.clone();
                    }
                    None => next.serial = next.serial.max(1),
                }
                mgr.write_state(Some(next.clone()))?;
                mgr.persist_state()?;
                tracing::info!(
                    workspace = %op.workspace,
                    serial = next.serial,
                    resources = next.resource_count(),
                    "State replaced"
                );
                Ok(OperationOutcome {
                    workspace: op.workspace,
                    state: Some(next),
                })
            }
        }
    }
}

/// State manager backed by a JSON file.
pub struct LocalStateManager {
    path: PathBuf,
    out_path: PathBuf,
    backup_path: Option<PathBuf>,
    state: Option<Snapshot>,
}

impl LocalStateManager {
    pub fn new(path: PathBuf) -> Self {
        Self {
            out_path: path.clone(),
            path,
            backup_path: None,
            state: None,
        }
    }

    pub fn with_out_path(mut self, out_path: PathBuf) -> Self {
        self.out_path = out_path;
        self
    }

    pub fn with_backup(mut self, backup_path: Option<PathBuf>) -> Self {
        self.backup_path = backup_path;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateManager for LocalStateManager {
    fn refresh_state(&mut self) -> Result<(), StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.state = None;
                return Ok(());
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            self.state = None;
            return Ok(());
        }

        let snapshot = serde_json::from_str(&content).map_err(|source| StateError::Parse {
            path: self.path.clone(),
            source,
        })?;
        self.state = Some(snapshot);
        Ok(())
    }

    fn state(&self) -> Option<&Snapshot> {
        self.state.as_ref()
    }

    fn write_state(&mut self, snapshot: Option<Snapshot>) -> Result<(), StateError> {
        self.state = snapshot;
        Ok(())
    }

    fn persist_state(&mut self) -> Result<(), StateError> {
        if let Some(backup) = &self.backup_path {
            if self.out_path.exists() {
                fs::copy(&self.out_path, backup).map_err(|source| StateError::Write {
                    path: backup.clone(),
                    source,
                })?;
            }
        }

        match &self.state {
            Some(snapshot) => {
                let bytes = serde_json::to_vec_pretty(snapshot)?;
                write_atomic(&self.out_path, &bytes).map_err(|source| StateError::Write {
                    path: self.out_path.clone(),
                    source,
                })
            }
            None => match fs::remove_file(&self.out_path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(StateError::Write {
                    path: self.out_path.clone(),
                    source,
                }),
            },
        }
    }
}
