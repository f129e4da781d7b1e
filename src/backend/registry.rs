use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::inmem::{InmemBackend, SharedStates};
use super::local::LocalBackend;
use super::Backend;

/// Produces a fresh, unconfigured backend instance.
pub type Constructor = Arc<dyn Fn() -> Box<dyn Backend> + Send + Sync>;

/// Maps backend type names to constructors.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the backends shipped in this crate: `local`, rooted at
    /// `working_dir`, and a process-shared `inmem`.
    pub fn with_builtins(working_dir: &Path) -> Self {
        let mut registry = Self::new();

        let dir = working_dir.to_path_buf();
        registry.register("local", move || Box::new(LocalBackend::new(&dir)));

        let states = SharedStates::default();
        registry.register("inmem", move || Box::new(InmemBackend::new(states.clone())));

        registry
    }

    /// Register (or replace) a backend type.
    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Backend> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        tracing::trace!(backend_type = %type_name, "Registered backend type");
        self.constructors.insert(type_name, Arc::new(constructor));
    }

    pub fn lookup(&self, type_name: &str) -> Option<Constructor> {
        self.constructors.get(type_name).cloned()
    }

    /// Construct a new instance of the named type.
    pub fn instantiate(&self, type_name: &str) -> Option<Box<dyn Backend>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names in sorted order.
    pub fn type_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
