//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_backend;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use berth::backend::{Backend, BackendRegistry, Enhanced, LocalBackend, Operation, Snapshot, StateManager};
use berth::diagnostics::DiagnosticKind;
use berth::record::{WorkingState, RECORD_FILENAME};
use berth::resolver::{ResolveError, ResolveFlags, Resolver};
use berth::settings::Settings;
use berth::ui::{Prompt, Ui, UiError};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use mock_backend::{HttpBackend, HttpOptions, HttpStore};

/// Name of the declaration file written by tests.
pub const DECLARATION_FILE: &str = "main.toml";

#[derive(Default)]
struct Script {
    interactive: bool,
    answers: VecDeque<String>,
    prompts: Vec<Prompt>,
    outputs: Vec<String>,
}

/// A UI that answers from a queue and records what it was shown.
///
/// Clones share the same script, so a test can keep a handle after boxing
/// one into a resolver.
#[derive(Clone, Default)]
pub struct ScriptedUi {
    script: Arc<Mutex<Script>>,
}

impl ScriptedUi {
    pub fn non_interactive() -> Self {
        Self::default()
    }

    pub fn answering(answers: &[&str]) -> Self {
        let ui = Self::default();
        {
            let mut script = ui.script.lock();
            script.interactive = true;
            script.answers = answers.iter().map(|a| a.to_string()).collect();
        }
        ui
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.script.lock().prompts.clone()
    }

    pub fn prompt_ids(&self) -> Vec<String> {
        self.prompts().into_iter().map(|p| p.id).collect()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.script.lock().outputs.clone()
    }

    fn next_answer(&self, prompt: &Prompt) -> Result<String, UiError> {
        let mut script = self.script.lock();
        if !script.interactive {
            return Err(UiError::InputDisabled {
                id: prompt.id.clone(),
            });
        }
        script.prompts.push(prompt.clone());
        script.answers.pop_front().ok_or_else(|| UiError::InputDisabled {
            id: prompt.id.clone(),
        })
    }
}

impl Ui for ScriptedUi {
    fn output(&mut self, message: &str) {
        self.script.lock().outputs.push(message.to_string());
    }

    fn is_interactive(&self) -> bool {
        self.script.lock().interactive
    }

    fn confirm(&mut self, prompt: &Prompt) -> Result<bool, UiError> {
        Ok(self.next_answer(prompt)? == "yes")
    }

    fn input(&mut self, prompt: &Prompt) -> Result<String, UiError> {
        self.next_answer(prompt)
    }
}

/// A temporary working directory plus the shared remote store.
pub struct Harness {
    pub dir: TempDir,
    pub http: HttpStore,
    pub options: HttpOptions,
    pub settings: Settings,
    pub ui: ScriptedUi,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            http: HttpStore::default(),
            options: HttpOptions::default(),
            settings: Settings::default(),
            ui: ScriptedUi::non_interactive(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the declaration file, replacing any previous one.
    pub fn declare(&self, content: &str) {
        fs::write(self.path().join(DECLARATION_FILE), content).expect("Failed to write declaration");
    }

    pub fn declare_http(&self, address: &str) {
        self.declare(&format!("[backend.http]\naddress = \"{}\"\n", address));
    }

    pub fn remove_declaration(&self) {
        fs::remove_file(self.path().join(DECLARATION_FILE)).expect("Failed to remove declaration");
    }

    /// Built-in backends plus the mock `http` backend.
    pub fn registry(&self) -> BackendRegistry {
        let mut registry = BackendRegistry::with_builtins(self.path());
        let store = self.http.clone();
        let options = self.options.clone();
        registry.register("http", move || {
            Box::new(HttpBackend::new(store.clone(), options.clone()))
        });
        registry
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(
            self.path(),
            self.registry(),
            self.settings.clone(),
            Box::new(self.ui.clone()),
        )
    }

    pub fn record_path(&self) -> PathBuf {
        self.path().join(".berth").join(RECORD_FILENAME)
    }

    pub fn record_bytes(&self) -> Option<Vec<u8>> {
        fs::read(self.record_path()).ok()
    }

    pub fn record(&self) -> Option<WorkingState> {
        self.record_bytes()
            .map(|bytes| serde_json::from_slice(&bytes).expect("record should parse"))
    }

    pub fn write_record(&self, content: &str) {
        let path = self.record_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Write a non-empty snapshot into a local workspace.
    pub fn seed_local(&self, workspace: &str) -> Snapshot {
        let snapshot = Snapshot::new().with_resource("null_resource.a", json!({"id": workspace}));
        let backend = LocalBackend::new(self.path());
        let mut mgr = backend.state_mgr(workspace).unwrap();
        mgr.write_state(Some(snapshot.clone())).unwrap();
        mgr.persist_state().unwrap();
        snapshot
    }

    pub fn local_state(&self, workspace: &str) -> Option<Snapshot> {
        let backend = LocalBackend::new(self.path());
        let mut mgr = backend.state_mgr(workspace).unwrap();
        mgr.refresh_state().unwrap();
        mgr.state().cloned()
    }

    /// Put a non-empty snapshot straight into the remote store.
    pub fn seed_http(&self, address: &str, workspace: &str) -> Snapshot {
        let snapshot = Snapshot::new().with_resource("null_resource.r", json!({"ws": workspace}));
        self.http
            .lock()
            .insert((address.to_string(), workspace.to_string()), snapshot.clone());
        snapshot
    }

    pub fn http_state(&self, address: &str, workspace: &str) -> Option<Snapshot> {
        self.http
            .lock()
            .get(&(address.to_string(), workspace.to_string()))
            .cloned()
    }
}

pub fn init() -> ResolveFlags {
    ResolveFlags {
        init: true,
        ..ResolveFlags::default()
    }
}

pub fn init_migrate() -> ResolveFlags {
    ResolveFlags {
        init: true,
        migrate_state: true,
        ..ResolveFlags::default()
    }
}

/// Read a workspace's state through a resolved backend.
pub fn show(backend: &dyn Enhanced, workspace: &str) -> Option<Snapshot> {
    backend
        .operation(Operation::show(workspace))
        .expect("show should succeed")
        .state
}

/// Diagnostic kinds carried by a failed resolution.
pub fn failure_kinds(err: &ResolveError) -> Vec<DiagnosticKind> {
    match err.diagnostics() {
        Some(diags) => diags.iter().map(|d| d.kind).collect(),
        None => panic!("expected diagnostics, got {}", err),
    }
}
