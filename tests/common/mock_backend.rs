//! Mock remote state backend for resolver tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use berth::backend::{
    Attribute, AttributeKind, Backend, ConfigSchema, ConfigValue, Enhanced, Snapshot, StateError,
    StateManager, WorkspaceError, DEFAULT_WORKSPACE,
};
use berth::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use parking_lot::Mutex;
use serde_json::json;

/// Snapshots keyed by (address, workspace), shared by every mock instance.
pub type HttpStore = Arc<Mutex<BTreeMap<(String, String), Snapshot>>>;

/// Knobs for simulating remote behavior.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Whether the backend lists workspaces at all.
    pub workspaces: bool,
    /// Persisting this workspace fails.
    pub fail_write_on: Option<String>,
    /// Whether `password` must be set.
    pub require_password: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            workspaces: true,
            fail_write_on: None,
            require_password: false,
        }
    }
}

/// A state-only backend addressed by URL. It cannot run operations itself.
pub struct HttpBackend {
    store: HttpStore,
    options: HttpOptions,
    address: Option<String>,
}

impl HttpBackend {
    pub fn new(store: HttpStore, options: HttpOptions) -> Self {
        Self {
            store,
            options,
            address: None,
        }
    }

    fn address(&self) -> Result<String, StateError> {
        self.address
            .clone()
            .ok_or_else(|| StateError::Backend("http backend is not configured".to_string()))
    }
}

impl Backend for HttpBackend {
    fn config_schema(&self) -> ConfigSchema {
        let password = if self.options.require_password {
            Attribute::required("password", AttributeKind::String)
        } else {
            Attribute::optional("password", AttributeKind::String)
        };
        ConfigSchema::new(vec![
            Attribute::required("address", AttributeKind::String)
                .describe("The address of the REST endpoint"),
            Attribute::optional("lock_address", AttributeKind::String),
            Attribute::optional("retry_max", AttributeKind::Number),
            Attribute::optional("skip_cert_verification", AttributeKind::Bool),
            password.sensitive().describe("The password for HTTP basic authentication"),
        ])
    }

    fn prepare_config(&mut self, mut config: ConfigValue) -> (ConfigValue, Diagnostics) {
        let mut diags = Diagnostics::new();
        if config.get_str("address").map_or(true, str::is_empty) {
            diags.push(Diagnostic::error(
                DiagnosticKind::Config,
                "Missing address",
                "The \"address\" attribute is required.",
            ));
        }
        if config.is_null("retry_max") {
            config.set("retry_max", json!(2));
        }
        (config, diags)
    }

    fn configure(&mut self, config: &ConfigValue) -> Diagnostics {
        self.address = config.get_str("address").map(str::to_string);
        Diagnostics::new()
    }

    fn workspaces(&self) -> Result<Vec<String>, WorkspaceError> {
        if !self.options.workspaces {
            return Err(WorkspaceError::NotSupported);
        }
        let address = self
            .address
            .clone()
            .ok_or_else(|| WorkspaceError::Backend("http backend is not configured".to_string()))?;

        let store = self.store.lock();
        let mut names = vec![DEFAULT_WORKSPACE.to_string()];
        names.extend(
            store
                .keys()
                .filter(|(addr, ws)| *addr == address && ws != DEFAULT_WORKSPACE)
                .map(|(_, ws)| ws.clone()),
        );
        Ok(names)
    }

    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, StateError> {
        Ok(Box::new(HttpStateManager {
            store: self.store.clone(),
            key: (self.address()?, workspace.to_string()),
            fail_write: self.options.fail_write_on.as_deref() == Some(workspace),
            state: None,
        }))
    }

    fn into_enhanced(self: Box<Self>) -> Result<Box<dyn Enhanced>, Box<dyn Backend>> {
        Err(self)
    }
}

struct HttpStateManager {
    store: HttpStore,
    key: (String, String),
    fail_write: bool,
    state: Option<Snapshot>,
}

impl StateManager for HttpStateManager {
    fn refresh_state(&mut self) -> Result<(), StateError> {
        self.state = self.store.lock().get(&self.key).cloned();
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
        if self.fail_write {
            return Err(StateError::Backend(format!(
                "simulated write failure for workspace {:?}",
                self.key.1
            )));
        }
        let mut store = self.store.lock();
        match &self.state {
            Some(snapshot) => {
                store.insert(self.key.clone(), snapshot.clone());
            }
            None => {
                store.remove(&self.key);
            }
        }
        Ok(())
    }
}
