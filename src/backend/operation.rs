//! Operations executed by enhanced backends.

use super::snapshot::Snapshot;

/// What an operation does to a workspace's state.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Read the current snapshot.
    Show,
    /// Replace the snapshot's resources, bumping the serial.
    Replace(Snapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub workspace: String,
    pub kind: OperationKind,
}

impl Operation {
    pub fn show(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            kind: OperationKind::Show,
        }
    }

    pub fn replace(workspace: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            workspace: workspace.into(),
            kind: OperationKind::Replace(snapshot),
        }
    }
}

/// Result of a completed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub workspace: String,
    /// The workspace's state after the operation, if any.
    pub state: Option<Snapshot>,
}
