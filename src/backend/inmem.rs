//! In-memory state backend shared across instances in one process.
//!
//! Every instance built by the same registry sees the same map, so state
//! written during one resolution is visible to the next.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{StateError, WorkspaceError};
use super::schema::{Attribute, AttributeKind, ConfigSchema, ConfigValue};
use super::snapshot::Snapshot;
use super::{Backend, Enhanced, StateManager, DEFAULT_WORKSPACE};
use crate::diagnostics::Diagnostics;

/// Workspace name to snapshot, shared between instances.
pub type SharedStates = Arc<Mutex<BTreeMap<String, Snapshot>>>;

pub struct InmemBackend {
    states: SharedStates,
    lock_id: Option<String>,
}

impl InmemBackend {
    pub fn new(states: SharedStates) -> Self {
        Self {
            states,
            lock_id: None,
        }
    }

    pub fn lock_id(&self) -> Option<&str> {
        self.lock_id.as_deref()
    }
}

impl Backend for InmemBackend {
    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new(vec![Attribute::optional("lock_id", AttributeKind::String)])
    }

    fn prepare_config(&mut self, config: ConfigValue) -> (ConfigValue, Diagnostics) {
        (config, Diagnostics::new())
    }

    fn configure(&mut self, config: &ConfigValue) -> Diagnostics {
        self.lock_id = config.get_str("lock_id").map(str::to_string);
        Diagnostics::new()
    }

    fn workspaces(&self) -> Result<Vec<String>, WorkspaceError> {
        let states = self.states.lock();
        let mut names = vec![DEFAULT_WORKSPACE.to_string()];
        names.extend(
            states
                .keys()
                .filter(|name| name.as_str() != DEFAULT_WORKSPACE)
                .cloned(),
        );
        Ok(names)
    }

    fn state_mgr(&self, workspace: &str) -> Result<Box<dyn StateManager>, StateError> {
        Ok(Box::new(InmemStateManager {
            states: self.states.clone(),
            workspace: workspace.to_string(),
            state: None,
        }))
    }

    fn into_enhanced(self: Box<Self>) -> Result<Box<dyn Enhanced>, Box<dyn Backend>> {
        Err(self)
    }
}

struct InmemStateManager {
    states: SharedStates,
    workspace: String,
    state: Option<Snapshot>,
}

impl StateManager for InmemStateManager {
    fn refresh_state(&mut self) -> Result<(), StateError> {
        self.state = self.states.lock().get(&self.workspace).cloned();
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
        let mut states = self.states.lock();
        match &self.state {
            Some(snapshot) => {
                states.insert(self.workspace.clone(), snapshot.clone());
            }
            None => {
                states.remove(&self.workspace);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_shared_between_instances() {
        let states = SharedStates::default();
        let first = InmemBackend::new(states.clone());
        let second = InmemBackend::new(states);

        let snapshot = Snapshot::new().with_resource("a.b", json!({}));
        let mut mgr = first.state_mgr("staging").unwrap();
        mgr.write_state(Some(snapshot.clone())).unwrap();
        mgr.persist_state().unwrap();

        assert_eq!(second.workspaces().unwrap(), vec!["default", "staging"]);
        let mut mgr = second.state_mgr("staging").unwrap();
        mgr.refresh_state().unwrap();
        assert_eq!(mgr.state(), Some(&snapshot));
    }

    #[test]
    fn test_not_enhanced() {
        let backend: Box<dyn Backend> = Box::new(InmemBackend::new(SharedStates::default()));
        assert!(backend.into_enhanced().is_err());
    }
}
