//! Copies workspace state snapshots from one backend to another.

use thiserror::Error;

use crate::backend::{Backend, StateError, WorkspaceError};
use crate::ui::{Prompt, Ui, UiError};

/// Two configured backends and the type labels shown to the operator.
pub struct MigrationPlan<'a> {
    pub source_type: &'a str,
    pub dest_type: &'a str,
    pub source: &'a dyn Backend,
    pub dest: &'a dyn Backend,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to list workspaces of the {backend_type:?} backend: {error}")]
    ListWorkspaces {
        backend_type: String,
        #[source]
        error: WorkspaceError,
    },

    #[error("Failed to read state of workspace {workspace:?} from the {backend_type:?} backend: {error}")]
    ReadSource {
        backend_type: String,
        workspace: String,
        #[source]
        error: StateError,
    },

    #[error("Failed to write state of workspace {workspace:?} to the {backend_type:?} backend: {error}")]
    WriteDest {
        backend_type: String,
        workspace: String,
        #[source]
        error: StateError,
    },

    #[error("Copying state from the {source_type:?} backend to the {dest_type:?} backend requires confirmation, but input is disabled. Enable input or set force_copy to copy without asking.")]
    ConfirmationRequired { source_type: String, dest_type: String },

    #[error("Migration from the {source_type:?} backend to the {dest_type:?} backend was declined; no state was copied")]
    Declined { source_type: String, dest_type: String },

    #[error("Error asking for state migration confirmation: {0}")]
    Prompt(#[from] UiError),
}

/// Workspaces handled by a completed migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    /// Workspaces skipped because their state was empty.
    pub skipped: Vec<String>,
}

pub struct MigrationEngine<'u> {
    ui: &'u mut dyn Ui,
    force_copy: bool,
}

impl<'u> MigrationEngine<'u> {
    /// With `force_copy`, state is copied without asking.
    pub fn new(ui: &'u mut dyn Ui, force_copy: bool) -> Self {
        Self { ui, force_copy }
    }

    /// Copy every non-empty workspace of `plan.source` into `plan.dest`.
    ///
    /// Each workspace is persisted as soon as it is copied. A failure stops
    /// the loop and leaves earlier workspaces in place.
    pub fn migrate(&mut self, plan: MigrationPlan<'_>) -> Result<MigrationReport, MigrationError> {
        let workspaces = match plan.source.workspaces() {
            Ok(names) => names,
            Err(WorkspaceError::NotSupported) => {
                tracing::debug!(backend_type = %plan.source_type, "Source backend has no workspaces");
                Vec::new()
            }
            Err(error) => {
                return Err(MigrationError::ListWorkspaces {
                    backend_type: plan.source_type.to_string(),
                    error,
                })
            }
        };

        let mut report = MigrationReport::default();
        let mut confirmed = false;

        for workspace in workspaces {
            let read_err = |error| MigrationError::ReadSource {
                backend_type: plan.source_type.to_string(),
                workspace: workspace.clone(),
                error,
            };
            let mut source_mgr = plan.source.state_mgr(&workspace).map_err(read_err)?;
            source_mgr.refresh_state().map_err(read_err)?;

            let snapshot = match source_mgr.state() {
                Some(snapshot) if !snapshot.is_empty() => snapshot.clone(),
                _ => {
                    tracing::trace!(workspace = %workspace, "Skipping workspace with empty state");
                    report.skipped.push(workspace);
                    continue;
                }
            };

            if !confirmed {
                self.confirm(&plan, &workspace)?;
                confirmed = true;
            }

            let write_err = |error| MigrationError::WriteDest {
                backend_type: plan.dest_type.to_string(),
                workspace: workspace.clone(),
                error,
            };
            let mut dest_mgr = plan.dest.state_mgr(&workspace).map_err(write_err)?;
            dest_mgr.write_state(Some(snapshot)).map_err(write_err)?;
            dest_mgr.persist_state().map_err(write_err)?;

            tracing::info!(
                workspace = %workspace,
                from = %plan.source_type,
                to = %plan.dest_type,
                "Migrated workspace state"
            );
            report.migrated.push(workspace);
        }

        Ok(report)
    }

    fn confirm(&mut self, plan: &MigrationPlan<'_>, workspace: &str) -> Result<(), MigrationError> {
        if self.force_copy {
            tracing::debug!("Copying state without confirmation");
            return Ok(());
        }
        if !self.ui.is_interactive() {
            return Err(MigrationError::ConfirmationRequired {
                source_type: plan.source_type.to_string(),
                dest_type: plan.dest_type.to_string(),
            });
        }

        let prompt = Prompt::new(
            "backend-migrate-copy-to-backend",
            "Do you want to copy existing state to the new backend?",
            format!(
                "Pre-existing state was found in workspace {:?} while migrating the previous {:?} backend \
                 to the newly configured {:?} backend. Do you want to copy this state to the new {:?} \
                 backend? Enter \"yes\" to copy. Any other answer aborts the backend change and leaves \
                 the previous configuration in place.",
                workspace, plan.source_type, plan.dest_type, plan.dest_type
            ),
        );
        if self.ui.confirm(&prompt)? {
            Ok(())
        } else {
            Err(MigrationError::Declined {
                source_type: plan.source_type.to_string(),
                dest_type: plan.dest_type.to_string(),
            })
        }
    }
}
