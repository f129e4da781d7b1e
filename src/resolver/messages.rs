//! Operator-facing text and the diagnostics built from it.

use std::fmt::Display;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

const INIT_REQUIRED_DETAIL: &str = r#"Reason: {reason}

The "backend" is the interface berth uses to store state, perform operations,
etc. If this message is showing up, it means that the configuration you're
using declares a custom backend.

Changes to backend configurations require reinitialization. This allows berth
to set up the new configuration, copy existing state, etc. Please run
"berth init" with either the "--reconfigure" or "--migrate-state" flags to use
the current configuration.

If the change reason above is incorrect, please verify your configuration
hasn't changed and try again. At this point, no changes to your existing
configuration or state have been made."#;

pub(crate) fn init_required(reason: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::InitRequired,
        "Backend initialization required, please run \"berth init\"",
        INIT_REQUIRED_DETAIL.replace("{reason}", reason),
    )
}

pub(crate) fn migrate_or_reconfigure() -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::MigrateOrReconfigure,
        "Backend configuration changed",
        "A change in the backend configuration has been detected, which may require migrating existing state.\n\n\
         If you wish to attempt automatic migration of the state, use \"berth init --migrate-state\".\n\
         If you wish to store the current configuration with no changes to the state, use \"berth init --reconfigure\".",
    )
}

pub(crate) fn legacy_remote_state() -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::LegacyRemoteState,
        "Legacy remote state not supported",
        "This working directory is configured for legacy remote state, which is no longer supported. \
         To migrate this working directory, first run \"init\" with an older release that still \
         understands legacy remote state, and then upgrade again.",
    )
}

pub(crate) fn load_record(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Failed to load backend record",
        format!("Failed to load state: {}", err),
    )
}

pub(crate) fn lock_failed(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Error locking state",
        format!("Error acquiring the state lock: {}", err),
    )
}

pub(crate) fn saved_unknown(type_name: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Unknown saved backend",
        format!(
            "The backend {:?} could not be found.\n\n\
             This is the backend that this working directory is configured to use, both in \
             your configuration and saved locally as your last-used backend. If it isn't found, \
             it could mean an alternate version of berth was used with this configuration.\n\n\
             If you'd like to force remove this backend, you must update your configuration to \
             not use the backend and run \"berth init\" again.",
            type_name
        ),
    )
}

pub(crate) fn new_unknown(type_name: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Unknown backend",
        format!(
            "The backend {:?} could not be found.\n\n\
             This is the backend specified in your configuration. This error could be a simple \
             typo in your configuration, but it can also be caused by using a version of berth \
             that doesn't support the specified backend type.\n\n\
             If you'd like to store state locally, remove the backend configuration.",
            type_name
        ),
    )
}

pub(crate) fn decode_cached(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Failed to decode current backend config",
        format!(
            "The backend configuration created by the most recent run of \"berth init\" could \
             not be decoded: {}. The configuration may have been initialized by an earlier \
             version that used an incompatible configuration structure. Run \
             \"berth init --reconfigure\" to force re-initialization of the backend.",
            err
        ),
    )
}

pub(crate) fn invalid_config(type_name: &str, err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Invalid backend configuration",
        format!("The configuration for the {:?} backend is invalid: {}", type_name, err),
    )
}

pub(crate) fn input_failed(type_name: &str, err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Error asking for input",
        format!("Error asking for input to configure backend {:?}: {}", type_name, err),
    )
}

pub(crate) fn local_read(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Error reading local state",
        format!(
            "Error reading local state: {}\n\n\
             berth is trying to read your local state to determine if there is state to \
             migrate to your newly configured backend. berth can't continue without this \
             check because that would risk losing state. Please resolve the error above and \
             try again.",
            err
        ),
    )
}

pub(crate) fn local_delete(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Error deleting local state after migration",
        format!(
            "Error deleting local state after migration: {}\n\n\
             Your local state is deleted after successfully migrating it to the newly \
             configured backend. A backup is made at the standard backup path unless \
             explicitly disabled. Please resolve the issue above and retry the command.",
            err
        ),
    )
}

pub(crate) fn write_saved(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Error saving the backend configuration",
        format!(
            "Error saving the backend configuration: {}\n\n\
             berth saves the complete backend configuration in a local file for configuring \
             the backend on future operations. Errors are usually due to simple file \
             permission errors. Please look at the error above, resolve it, and try again.",
            err
        ),
    )
}

pub(crate) fn clear_saved(err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Io,
        "Error clearing the backend configuration",
        format!(
            "Error clearing the backend configuration: {}\n\n\
             berth removes the saved backend configuration when you're removing a configured \
             backend, so future runs know not to use it. Please look at the error above, \
             resolve it, and try again.",
            err
        ),
    )
}

pub(crate) fn migration_failed(err: impl Display) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Migration, "Error migrating state", err.to_string())
}

pub(crate) fn cli_init_failed(type_name: &str, err: impl Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Backend,
        "Error initializing backend",
        format!(
            "Error initializing backend {:?}: {}\n\nThis is a bug; please report it to the backend developer",
            type_name, err
        ),
    )
}

pub(crate) fn workspace_failed(err: impl Display) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Workspace, "Workspace selection failed", err.to_string())
}

pub(crate) fn plan_workspace_mismatch(planned: &str, selected: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Workspace,
        "Selected workspace does not match the plan",
        format!(
            "The plan was created for workspace {:?}, but the currently selected workspace is {:?}. \
             Select the plan's workspace and try again.",
            planned, selected
        ),
    )
}

pub(crate) fn output_migrate_local(type_name: &str) -> String {
    format!("berth has detected you're unconfiguring your previously set {:?} backend.", type_name)
}

pub(crate) fn output_migrate_change(from: &str, to: &str) -> String {
    format!("berth detected that the backend type changed from {:?} to {:?}.", from, to)
}

pub(crate) const OUTPUT_RECONFIGURE: &str = "Backend configuration changed!\n\n\
berth has detected that the configuration specified for the backend has changed.\n\
berth will now check for existing state in the backends.\n";

pub(crate) fn success_unset(type_name: &str) -> String {
    format!(
        "\nSuccessfully unset the backend {:?}. berth will now operate locally.",
        type_name
    )
}

pub(crate) fn success_set(type_name: &str) -> String {
    format!(
        "\nSuccessfully configured the backend {:?}! berth will automatically\n\
         use this backend unless the backend configuration changes.",
        type_name
    )
}
