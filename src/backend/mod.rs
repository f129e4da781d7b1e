//! Backend capability surface.
//!
//! A backend stores per-workspace state and, if it is [`Enhanced`], also
//! executes operations. Optional capabilities are exposed through explicit
//! accessors on [`Backend`] instead of runtime type checks.

mod error;
pub mod inmem;
pub mod local;
mod operation;
mod registry;
pub mod schema;
mod snapshot;

use std::path::{Path, PathBuf};

pub use error::{CliInitError, OperationError, StateError, WorkspaceError};
pub use inmem::InmemBackend;
pub use local::{LocalBackend, LocalStateManager};
pub use operation::{Operation, OperationKind, OperationOutcome};
pub use registry::{BackendRegistry, Constructor};
pub use schema::{Attribute, AttributeKind, ConfigBody, ConfigSchema, ConfigValue, DecodeError};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};

use crate::diagnostics::Diagnostics;

/// Name of the workspace every backend starts with.
pub const DEFAULT_WORKSPACE: &str = "default";

/// A pluggable state storage backend.
///
/// Instances are constructed fresh for every resolution and configured once
/// via [`Backend::prepare_config`] followed by [`Backend::configure`].
pub trait Backend: Send {
    /// Attributes accepted in this backend's configuration block.
    fn config_schema(&self) -> ConfigSchema;

    /// Validate a decoded configuration and fill in defaults.
    fn prepare_config(&mut self, config: ConfigValue) -> (ConfigValue, Diagnostics);

    /// Apply a prepared configuration. May perform network calls.
    fn configure(&mut self, config: &ConfigValue) -> Diagnostics;

    /// Names of all workspaces that currently exist.
    ///
    /// Backends with a single implicit workspace return
    /// [`WorkspaceError::NotSupported`].
    fn workspaces(&self) -> Result<Vec<String>, WorkspaceError>;

    /// State manager for the named workspace.
    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, StateError>;

    /// Filesystem locations this backend stores state in, if it is file based.
    fn local_paths(&self) -> Option<LocalPaths> {
        None
    }

    /// CLI initialization capability, if supported.
    fn as_cli_init(&mut self) -> Option<&mut dyn CliInit> {
        None
    }

    /// Convert into an operation-executing backend, or hand the backend back
    /// unchanged if it only stores state.
    fn into_enhanced(self: Box<Self>) -> Result<Box<dyn Enhanced>, Box<dyn Backend>>;
}

/// A backend that can execute operations, not just store state.
pub trait Enhanced: Backend {
    fn operation(&self, op: Operation) -> Result<OperationOutcome, OperationError>;
}

/// Backends that accept options from the command line.
pub trait CliInit {
    fn cli_init(&mut self, opts: &CliOpts) -> Result<(), CliInitError>;
}

/// Options passed to backends supporting [`CliInit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOpts {
    /// Override for the default workspace's local state file.
    pub state_path: Option<PathBuf>,
    /// Where to write state instead of `state_path`.
    pub state_out_path: Option<PathBuf>,
    /// Where to keep the previous state file; `-` disables backups.
    pub backup_path: Option<PathBuf>,
}

/// Per-workspace state access.
pub trait StateManager {
    /// Load the latest snapshot from storage.
    fn refresh_state(&mut self) -> Result<(), StateError>;

    /// The in-memory snapshot, `None` when there is no state.
    fn state(&self) -> Option<&Snapshot>;

    /// Replace the in-memory snapshot. `None` clears it.
    fn write_state(&mut self, snapshot: Option<Snapshot>) -> Result<(), StateError>;

    /// Flush the in-memory snapshot to storage.
    fn persist_state(&mut self) -> Result<(), StateError>;
}

/// Where a file-based backend keeps its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    pub state_path: PathBuf,
    pub state_out_path: PathBuf,
    pub workspace_dir: PathBuf,
}

impl LocalPaths {
    /// Whether two backends would read or write the same files.
    pub fn conflicts_with(&self, other: &LocalPaths) -> bool {
        same_path(&self.state_path, &other.state_path)
            || same_path(&self.state_out_path, &other.state_out_path)
            || same_path(&self.workspace_dir, &other.workspace_dir)
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Whether `a` and `b` are both file based and share storage.
pub fn paths_conflict(a: &dyn Backend, b: &dyn Backend) -> bool {
    match (a.local_paths(), b.local_paths()) {
        (Some(a), Some(b)) => a.conflicts_with(&b),
        _ => false,
    }
}
