//! Backend resolution for a working directory.
//!
//! [`Resolver`] reconciles the declared backend configuration, the cached
//! record of the last `init`, and legacy remote state into one live backend.
//! When the decision changes it migrates state between the old and new
//! backends before rewriting the record, so the working directory always has
//! a usable state.

mod change;
mod messages;
mod migrate;
mod plan;
mod transition;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

pub use change::ChangeDetector;
pub use migrate::{MigrationEngine, MigrationError, MigrationPlan, MigrationReport};
pub use plan::PlanBackend;
pub use transition::Transition;

use crate::backend::{
    paths_conflict, AttributeKind, Backend, BackendRegistry, CliInit, CliOpts, ConfigBody,
    ConfigSchema, ConfigValue, Enhanced, LocalBackend, StateManager,
};
use crate::config::{BackendConfig, ConfigResolver, ResolvedConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::record::{CachedBackend, RecordStore, StateLock, RECORD_FILENAME};
use crate::settings::Settings;
use crate::ui::{Prompt, Ui};
use crate::workspace::{data_dir_in, select_workspace, WorkspaceSelection};

/// Options for one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveFlags {
    /// Initialization is allowed; transitions that rewrite the record need it.
    pub init: bool,
    /// State may be migrated when the backend is removed or changed.
    pub migrate_state: bool,
    /// Use purely local state and ignore any backend configuration.
    pub force_local: bool,
    /// Ignore the cached record and configure from scratch, without migrating.
    pub reconfigure: bool,
}

/// The outcome of a successful resolution.
pub struct Resolution {
    /// The live backend, wrapped in the local execution adapter if needed.
    pub backend: Box<dyn Enhanced>,
    pub transition: Transition,
    /// The effective backend record. When no backend is configured this is a
    /// synthesized `local` record that is never persisted.
    pub record: CachedBackend,
    /// The record that was cached before this resolution, if any.
    pub previous: Option<CachedBackend>,
    /// Warnings gathered along the way.
    pub diagnostics: Diagnostics,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("transition", &self.transition)
            .field("record", &self.record)
            .field("previous", &self.previous)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A recoverable failure; nothing was committed.
    #[error("{0}")]
    Failed(Diagnostics),

    /// An internal invariant did not hold.
    #[error("Internal error: {0}. This is a bug; please report it")]
    Invariant(String),
}

impl ResolveError {
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            ResolveError::Failed(diags) => Some(diags),
            ResolveError::Invariant(_) => None,
        }
    }
}

impl From<Diagnostics> for ResolveError {
    fn from(diags: Diagnostics) -> Self {
        ResolveError::Failed(diags)
    }
}

impl From<Diagnostic> for ResolveError {
    fn from(diag: Diagnostic) -> Self {
        ResolveError::Failed(diag.into())
    }
}

/// A backend chosen by a transition, before capability wrapping.
struct Chosen {
    backend: Option<Box<dyn Backend>>,
    record: CachedBackend,
    diagnostics: Diagnostics,
}

pub struct Resolver {
    working_dir: PathBuf,
    registry: BackendRegistry,
    settings: Settings,
    store: RecordStore,
    selection: WorkspaceSelection,
    detector: ChangeDetector,
    cli_opts: CliOpts,
    ui: Box<dyn Ui>,
}

impl Resolver {
    pub fn new(working_dir: &Path, registry: BackendRegistry, settings: Settings, ui: Box<dyn Ui>) -> Self {
        let data_dir = data_dir_in(working_dir, &settings.data_dir);
        Self {
            working_dir: working_dir.to_path_buf(),
            registry,
            store: RecordStore::new(data_dir.join(RECORD_FILENAME)),
            selection: WorkspaceSelection::new(data_dir, settings.workspace.clone()),
            detector: ChangeDetector::new(),
            cli_opts: CliOpts::default(),
            settings,
            ui,
        }
    }

    /// State path overrides handed to backends supporting CLI initialization.
    pub fn with_state_paths(
        mut self,
        state_path: Option<PathBuf>,
        state_out_path: Option<PathBuf>,
        backup_path: Option<PathBuf>,
    ) -> Self {
        self.cli_opts.state_path = state_path;
        self.cli_opts.state_out_path = state_out_path;
        self.cli_opts.backup_path = backup_path;
        self
    }

    pub fn record_path(&self) -> &Path {
        self.store.path()
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &WorkspaceSelection {
        &self.selection
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Resolve the backend for an operation, migrating state if the
    /// configured backend changed and `flags` allow it.
    pub fn resolve_for_operation(
        &mut self,
        config: Option<BackendConfig>,
        override_body: Option<ConfigBody>,
        flags: ResolveFlags,
    ) -> Result<Resolution, ResolveError> {
        self.store.refresh_state().map_err(messages::load_record)?;

        if self.store.state().has_legacy_remote() {
            return Err(messages::legacy_remote_state().into());
        }

        let previous = self.store.state().backend().cloned();

        if flags.force_local {
            tracing::trace!("Forcing purely local state");
            let backend = self.finish(None, "local")?;
            return Ok(Resolution {
                backend,
                transition: Transition::NoOp,
                record: CachedBackend::synthetic_local(),
                previous,
                diagnostics: Diagnostics::new(),
            });
        }

        let resolved = ConfigResolver::new(&self.working_dir, &self.registry)
            .resolve(config, override_body)
            .map_err(ResolveError::Failed)?;

        let cached = if flags.reconfigure {
            tracing::trace!("Reconfiguring; ignoring the cached backend record");
            None
        } else {
            previous.clone()
        };

        let transition = transition::classify(
            resolved.as_ref(),
            cached.as_ref(),
            flags.init,
            &self.registry,
            &mut self.detector,
        );
        tracing::debug!(%transition, "Classified backend resolution");

        let chosen = match (transition, resolved.as_ref(), cached.as_ref()) {
            (Transition::NoOp, None, None) => Chosen {
                backend: None,
                record: CachedBackend::synthetic_local(),
                diagnostics: Diagnostics::new(),
            },
            (Transition::Unconfigure, None, Some(cached)) => {
                self.require_init(
                    flags,
                    &format!("Unsetting the previously set backend {:?}", cached.type_name),
                )?;
                self.require_migrate(flags)?;
                let _lock = self.lock("backend unconfigure")?;
                self.unconfigure(cached)?
            }
            (Transition::FirstTime, Some(live), None) => {
                self.require_init(
                    flags,
                    &format!("Initial configuration of the requested backend {:?}", live.type_name()),
                )?;
                let _lock = self.lock("backend first-time configuration")?;
                self.first_time(live)?
            }
            (Transition::Unchanged, Some(live), Some(cached)) => {
                let _lock = if live.fingerprint != cached.hash {
                    self.lock("backend fingerprint update")?
                } else {
                    None
                };
                self.unchanged(live, cached)?
            }
            (Transition::Reconfigure, Some(live), Some(cached)) => {
                let reason = if cached.type_name != live.type_name() {
                    format!(
                        "Backend configuration changed from {:?} to {:?}",
                        cached.type_name,
                        live.type_name()
                    )
                } else {
                    format!("Backend configuration changed for {:?}", live.type_name())
                };
                self.require_init(flags, &reason)?;
                self.require_migrate(flags)?;
                tracing::warn!(backend_type = %live.type_name(), "Backend config has changed since last init");
                let _lock = self.lock("backend reconfiguration")?;
                self.reconfigure(live, cached)?
            }
            (transition, live, cached) => {
                return Err(ResolveError::Invariant(format!(
                    "unhandled backend configuration state: transition {}, config present {}, saved backend present {}",
                    transition,
                    live.is_some(),
                    cached.is_some()
                )))
            }
        };

        let Chosen {
            backend,
            record,
            mut diagnostics,
        } = chosen;

        if flags.init {
            if let Some(backend) = &backend {
                select_workspace(&**backend, &self.selection, self.ui.as_mut())
                    .map_err(messages::workspace_failed)?;
            }
        }

        let backend = self.finish(backend, &record.type_name)?;
        diagnostics = diagnostics_without_errors(diagnostics)?;

        tracing::info!(
            %transition,
            backend_type = %record.type_name,
            "Resolved backend"
        );
        Ok(Resolution {
            backend,
            transition,
            record,
            previous,
            diagnostics,
        })
    }

    /// Instantiate the backend named by the cached record without migrating
    /// or writing anything. Falls back to pure local state when no backend
    /// was ever initialized.
    pub fn resolve_from_cached_record_only(&mut self) -> Result<(Box<dyn Backend>, Diagnostics), ResolveError> {
        self.store.refresh_state().map_err(messages::load_record)?;

        match self.store.state().backend().cloned() {
            None => {
                tracing::trace!("No initialized backend in this working directory; using local state");
                Ok((Box::new(LocalBackend::new(&self.working_dir)), Diagnostics::new()))
            }
            Some(cached) => {
                tracing::trace!(backend_type = %cached.type_name, "Using the saved backend");
                self.instantiate_cached(&cached)
            }
        }
    }

    /// Instantiate the backend saved in a plan.
    ///
    /// The plan must have been created in the currently selected workspace.
    pub fn resolve_for_plan(&mut self, plan: &PlanBackend) -> Result<(Box<dyn Enhanced>, Diagnostics), ResolveError> {
        let current = self.selection.current().map_err(messages::workspace_failed)?;
        if plan.workspace != current {
            return Err(messages::plan_workspace_mismatch(&plan.workspace, &current).into());
        }

        let mut backend = self
            .registry
            .instantiate(&plan.type_name)
            .ok_or_else(|| messages::saved_unknown(&plan.type_name))?;
        tracing::trace!(backend_type = %plan.type_name, "Instantiated backend from plan");

        let schema = backend.config_schema();
        let value = schema
            .decode_raw(&plan.config)
            .map_err(|e| messages::invalid_config(&plan.type_name, format!("saved backend configuration is invalid: {}", e)))?;

        let mut diags = Diagnostics::new();
        let (prepared, prepare_diags) = backend.prepare_config(value);
        diags.extend(prepare_diags);
        if diags.has_errors() {
            return Err(diags.into());
        }
        diags.extend(backend.configure(&prepared));
        if diags.has_errors() {
            return Err(diags.into());
        }

        let enhanced = self.finish(Some(backend), &plan.type_name)?;
        Ok((enhanced, diags))
    }

    /// Backend settings to embed in a plan created with `record`.
    pub fn plan_backend(&self, record: &CachedBackend) -> Result<PlanBackend, ResolveError> {
        let workspace = self.selection.current().map_err(messages::workspace_failed)?;
        let backend = self.registry.instantiate(&record.type_name).ok_or_else(|| {
            ResolveError::Invariant(format!("backend {:?} of a resolved record is not registered", record.type_name))
        })?;
        record
            .for_plan(&backend.config_schema(), &workspace)
            .map_err(|e| ResolveError::Invariant(format!("failed to encode backend configuration for plan: {}", e)))
    }

    fn require_init(&self, flags: ResolveFlags, reason: &str) -> Result<(), ResolveError> {
        if flags.init {
            Ok(())
        } else {
            Err(messages::init_required(reason).into())
        }
    }

    fn require_migrate(&self, flags: ResolveFlags) -> Result<(), ResolveError> {
        if flags.migrate_state {
            Ok(())
        } else {
            Err(messages::migrate_or_reconfigure().into())
        }
    }

    fn lock(&self, reason: &str) -> Result<Option<StateLock>, ResolveError> {
        if !self.settings.lock.enabled {
            return Ok(None);
        }
        let timeout = Duration::from_secs(self.settings.lock.timeout_seconds);
        StateLock::acquire(self.store.path(), timeout, reason)
            .map(Some)
            .map_err(|e| messages::lock_failed(e).into())
    }

    /// A purely local backend with the CLI path overrides applied.
    fn pure_local(&self) -> Result<LocalBackend, ResolveError> {
        let mut local = LocalBackend::new(&self.working_dir);
        local
            .cli_init(&self.cli_opts)
            .map_err(|e| ResolveError::Invariant(format!("local backend failed to initialize: {}", e)))?;
        Ok(local)
    }

    fn unconfigure(&mut self, cached: &CachedBackend) -> Result<Chosen, ResolveError> {
        self.ui.output(&messages::output_migrate_local(&cached.type_name));

        let local = self.pure_local()?;
        let (old, diagnostics) = self.instantiate_cached(cached)?;

        let report = MigrationEngine::new(self.ui.as_mut(), self.settings.force_copy)
            .migrate(MigrationPlan {
                source_type: &cached.type_name,
                dest_type: "local",
                source: old.as_ref(),
                dest: &local,
            })
            .map_err(messages::migration_failed)?;
        tracing::debug!(migrated = report.migrated.len(), "Unconfigure migration complete");

        let mut state = self.store.state().clone();
        state.backend = None;
        self.store.write_state(state);
        self.store.persist_state().map_err(messages::clear_saved)?;

        self.ui.output(&messages::success_unset(&cached.type_name));
        Ok(Chosen {
            backend: None,
            record: CachedBackend::synthetic_local(),
            diagnostics,
        })
    }

    fn first_time(&mut self, live: &ResolvedConfig) -> Result<Chosen, ResolveError> {
        let (backend, config_value, diagnostics) = self.init_from_config(live)?;

        let local = self.pure_local()?;
        let workspaces = local.workspaces().map_err(messages::local_read)?;

        let mut local_states: Vec<Box<dyn StateManager>> = Vec::new();
        for workspace in workspaces {
            let mut mgr = local.state_mgr(&workspace).map_err(messages::local_read)?;
            mgr.refresh_state().map_err(messages::local_read)?;
            if mgr.state().map_or(false, |s| !s.is_empty()) {
                tracing::trace!(workspace = %workspace, "Local workspace state must be migrated");
                local_states.push(mgr);
            } else {
                tracing::trace!(workspace = %workspace, "Ignoring local workspace with empty state");
            }
        }

        if !local_states.is_empty() {
            MigrationEngine::new(self.ui.as_mut(), self.settings.force_copy)
                .migrate(MigrationPlan {
                    source_type: "local",
                    dest_type: live.type_name(),
                    source: &local,
                    dest: backend.as_ref(),
                })
                .map_err(messages::migration_failed)?;

            if paths_conflict(backend.as_ref(), &local) {
                tracing::trace!("Old and new backends share local state paths; not erasing old state");
            } else {
                tracing::trace!("Removing migrated state snapshots from the local backend");
                for mgr in local_states.iter_mut() {
                    mgr.write_state(None).map_err(messages::local_delete)?;
                    mgr.persist_state().map_err(messages::local_delete)?;
                }
            }
        }

        let record = CachedBackend::new(live.type_name(), config_value.to_raw(), live.fingerprint);
        self.save_record(record.clone())?;

        self.ui.output(&messages::success_set(live.type_name()));
        Ok(Chosen {
            backend: Some(backend),
            record,
            diagnostics,
        })
    }

    fn unchanged(&mut self, live: &ResolvedConfig, cached: &CachedBackend) -> Result<Chosen, ResolveError> {
        let mut record = cached.clone();
        let (backend, diagnostics) = self.instantiate_cached(&record)?;

        // Overrides may move a value between the file and the command line
        // without changing the decoded config; only the fingerprint changes.
        if live.fingerprint != record.hash {
            tracing::debug!(
                backend_type = %record.type_name,
                old = %record.hash,
                new = %live.fingerprint,
                "Updating backend fingerprint"
            );
            record.hash = live.fingerprint;
            self.save_record(record.clone())?;
        }

        Ok(Chosen {
            backend: Some(backend),
            record,
            diagnostics,
        })
    }

    fn reconfigure(&mut self, live: &ResolvedConfig, cached: &CachedBackend) -> Result<Chosen, ResolveError> {
        self.ui.output(messages::OUTPUT_RECONFIGURE);

        let (backend, config_value, mut diagnostics) = self.init_from_config(live)?;
        if cached.type_name != live.type_name() {
            self.ui
                .output(&messages::output_migrate_change(&cached.type_name, live.type_name()));
        }

        let (old, old_diags) = self.instantiate_cached(cached)?;
        diagnostics.extend(old_diags);

        MigrationEngine::new(self.ui.as_mut(), self.settings.force_copy)
            .migrate(MigrationPlan {
                source_type: &cached.type_name,
                dest_type: live.type_name(),
                source: old.as_ref(),
                dest: backend.as_ref(),
            })
            .map_err(messages::migration_failed)?;

        let record = CachedBackend::new(live.type_name(), config_value.to_raw(), live.fingerprint);
        self.save_record(record.clone())?;

        self.ui.output(&messages::success_set(live.type_name()));
        Ok(Chosen {
            backend: Some(backend),
            record,
            diagnostics,
        })
    }

    fn save_record(&mut self, record: CachedBackend) -> Result<(), ResolveError> {
        let mut state = self.store.state().clone();
        state.backend = Some(record);
        self.store.write_state(state);
        self.store.persist_state().map_err(messages::write_saved)?;
        Ok(())
    }

    /// Build and configure a backend from the saved record.
    fn instantiate_cached(&self, cached: &CachedBackend) -> Result<(Box<dyn Backend>, Diagnostics), ResolveError> {
        let mut backend = self
            .registry
            .instantiate(&cached.type_name)
            .ok_or_else(|| messages::saved_unknown(&cached.type_name))?;

        let schema = backend.config_schema();
        let value = cached.config(&schema).map_err(messages::decode_cached)?;

        let mut diags = Diagnostics::new();
        let (prepared, prepare_diags) = backend.prepare_config(value);
        diags.extend(prepare_diags);
        if diags.has_errors() {
            return Err(diags.into());
        }
        diags.extend(backend.configure(&prepared));
        if diags.has_errors() {
            return Err(diags.into());
        }
        Ok((backend, diags))
    }

    /// Build and configure a backend from the declared configuration.
    ///
    /// Returns the decoded value to save in the record, before
    /// `prepare_config` defaults are applied.
    fn init_from_config(
        &mut self,
        live: &ResolvedConfig,
    ) -> Result<(Box<dyn Backend>, ConfigValue, Diagnostics), ResolveError> {
        let type_name = live.type_name();
        let decl_range = live.config.decl_range.as_ref();

        let mut backend = self
            .registry
            .instantiate(type_name)
            .ok_or_else(|| messages::new_unknown(type_name))?;
        let schema = backend.config_schema();

        let mut value = schema.decode_none_required(&live.merged).map_err(|e| {
            let mut diag = messages::invalid_config(type_name, e);
            if let Some(range) = decl_range {
                diag = diag.with_subject(range.clone());
            }
            diag
        })?;

        if self.settings.input && self.ui.is_interactive() {
            value = self.input_for_schema(type_name, value, &schema)?;
        }

        let mut diags = Diagnostics::new();
        let (prepared, prepare_diags) = backend.prepare_config(value.clone());
        diags.extend(prepare_diags.in_config_body(decl_range));
        if diags.has_errors() {
            return Err(diags.into());
        }
        diags.extend(backend.configure(&prepared).in_config_body(decl_range));
        if diags.has_errors() {
            return Err(diags.into());
        }

        Ok((backend, value, diags))
    }

    /// Ask the operator for required attributes the configuration left unset.
    fn input_for_schema(
        &mut self,
        type_name: &str,
        mut value: ConfigValue,
        schema: &ConfigSchema,
    ) -> Result<ConfigValue, ResolveError> {
        for attr in schema.attributes() {
            if !attr.required || !value.is_null(&attr.name) {
                continue;
            }

            let prompt = Prompt::new(
                format!("backend-{}-{}", type_name, attr.name),
                attr.name.clone(),
                attr.description.clone(),
            )
            .sensitive(attr.sensitive);
            let answer = self
                .ui
                .input(&prompt)
                .map_err(|e| messages::input_failed(type_name, e))?;
            if answer.is_empty() {
                // Left null so prepare_config reports the missing value.
                continue;
            }

            let parsed = parse_input(attr.kind, &answer).ok_or_else(|| {
                messages::input_failed(
                    type_name,
                    format!("{:?} requires a {}", attr.name, attr.kind.label()),
                )
            })?;
            tracing::trace!(attribute = %attr.name, sensitive = attr.sensitive, "Received input for backend attribute");
            value.set(attr.name.clone(), parsed);
        }
        Ok(value)
    }

    /// Run CLI initialization and wrap non-enhanced backends in the local
    /// execution adapter.
    fn finish(
        &self,
        backend: Option<Box<dyn Backend>>,
        type_name: &str,
    ) -> Result<Box<dyn Enhanced>, ResolveError> {
        let opts = &self.cli_opts;

        let mut backend = backend;
        if let Some(backend) = backend.as_mut() {
            if let Some(cli) = backend.as_cli_init() {
                cli.cli_init(opts)
                    .map_err(|e| messages::cli_init_failed(type_name, e))?;
            }
        }

        let state_backend = match backend {
            Some(backend) => match backend.into_enhanced() {
                Ok(enhanced) => {
                    tracing::trace!(backend_type = %type_name, "Backend supports operations");
                    return Ok(enhanced);
                }
                Err(backend) => {
                    tracing::trace!(
                        backend_type = %type_name,
                        "Backend does not support operations; wrapping it in the local backend"
                    );
                    Some(backend)
                }
            },
            None => None,
        };

        let mut local = LocalBackend::with_state_backend(&self.working_dir, state_backend);
        local
            .cli_init(opts)
            .map_err(|e| ResolveError::Invariant(format!("local execution adapter failed to initialize: {}", e)))?;
        Ok(Box::new(local))
    }
}

/// Pass warnings through; turn any remaining error into a failure.
fn diagnostics_without_errors(diags: Diagnostics) -> Result<Diagnostics, ResolveError> {
    if diags.has_errors() {
        Err(ResolveError::Failed(diags))
    } else {
        Ok(diags)
    }
}

fn parse_input(kind: AttributeKind, raw: &str) -> Option<Value> {
    let value = match kind {
        AttributeKind::String => Value::String(raw.to_string()),
        AttributeKind::Bool => Value::Bool(raw.parse().ok()?),
        AttributeKind::Number | AttributeKind::List | AttributeKind::Map => serde_json::from_str(raw).ok()?,
    };
    kind.accepts(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use serde_json::json;

    #[test]
    fn test_parse_input_by_kind() {
        assert_eq!(parse_input(AttributeKind::String, "x"), Some(json!("x")));
        assert_eq!(parse_input(AttributeKind::Bool, "true"), Some(json!(true)));
        assert_eq!(parse_input(AttributeKind::Number, "3"), Some(json!(3)));
        assert_eq!(parse_input(AttributeKind::List, "[1, 2]"), Some(json!([1, 2])));
        assert_eq!(parse_input(AttributeKind::Number, "[1]"), None);
        assert_eq!(parse_input(AttributeKind::Bool, "maybe"), None);
    }

    #[test]
    fn test_resolve_error_exposes_diagnostics() {
        let err = ResolveError::from(messages::migrate_or_reconfigure());
        assert!(err.diagnostics().unwrap().has_kind(DiagnosticKind::MigrateOrReconfigure));
        assert!(ResolveError::Invariant("x".into()).diagnostics().is_none());
    }
}
