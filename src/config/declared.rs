use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::backend::ConfigBody;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, SourceRange};

use super::merge::merge_bodies;
use super::value::to_json;

/// Extension of files scanned for a declared backend block.
pub const CONFIG_EXTENSION: &str = "toml";

/// A backend block as declared in configuration, plus an optional override
/// body supplied on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub type_name: String,
    pub body: ConfigBody,
    pub override_body: Option<ConfigBody>,
    /// Where the block was declared, if it came from a file.
    pub decl_range: Option<SourceRange>,
}

impl BackendConfig {
    pub fn new(type_name: impl Into<String>, body: ConfigBody) -> Self {
        Self {
            type_name: type_name.into(),
            body,
            override_body: None,
            decl_range: None,
        }
    }

    pub fn with_override(mut self, override_body: ConfigBody) -> Self {
        self.override_body = Some(override_body);
        self
    }

    pub fn has_override(&self) -> bool {
        self.override_body.is_some()
    }

    /// The declared body with the override applied.
    pub fn merged_body(&self) -> ConfigBody {
        match &self.override_body {
            Some(overrides) => merge_bodies(&self.body, overrides),
            None => self.body.clone(),
        }
    }
}

/// Scan `dir` for a `[backend.<type>]` table in any `*.toml` file.
///
/// Returns `Ok(None)` when no file declares a backend. A block that is
/// present but empty is returned with an empty body. Declaring more than one
/// backend is an error.
pub fn load_declared(dir: &Path) -> Result<Option<BackendConfig>, Diagnostics> {
    let mut found: Option<BackendConfig> = None;

    for path in config_files(dir)? {
        let content = fs::read_to_string(&path).map_err(|e| {
            Diagnostics::from(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Failed to read configuration file",
                    format!("Could not read {}: {}", path.display(), e),
                )
                .with_subject(SourceRange::file(&path)),
            )
        })?;

        let table: toml::Table = toml::from_str(&content).map_err(|e| {
            Diagnostics::from(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Failed to parse configuration file",
                    format!("{}: {}", path.display(), e),
                )
                .with_subject(SourceRange::file(&path)),
            )
        })?;

        let Some(backends) = table.get("backend") else {
            continue;
        };
        let Some(backends) = backends.as_table() else {
            return Err(Diagnostic::error(
                DiagnosticKind::Config,
                "Invalid backend block",
                "The \"backend\" key must be a table of the form [backend.<type>].",
            )
            .with_subject(SourceRange::file(&path))
            .into());
        };

        for (type_name, block) in backends {
            let range = SourceRange {
                filename: path.clone(),
                line: header_line(&content, type_name),
            };

            if let Some(previous) = &found {
                let first = previous
                    .decl_range
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(Diagnostic::error(
                    DiagnosticKind::Config,
                    "Duplicate backend configuration",
                    format!(
                        "A module may have only one backend configuration. The backend was previously configured at {}.",
                        first
                    ),
                )
                .with_subject(range)
                .into());
            }

            let body = match to_json(block.clone(), type_name) {
                Ok(Value::Object(map)) => map,
                Err(e) => {
                    return Err(Diagnostic::error(DiagnosticKind::Config, "Invalid backend block", e.to_string())
                        .with_subject(range)
                        .into())
                }
                Ok(_) => {
                    return Err(Diagnostic::error(
                        DiagnosticKind::Config,
                        "Invalid backend block",
                        format!("The backend block for \"{}\" must be a table.", type_name),
                    )
                    .with_subject(range)
                    .into())
                }
            };

            tracing::debug!(
                backend_type = %type_name,
                file = %path.display(),
                "Found declared backend block"
            );
            found = Some(BackendConfig {
                type_name: type_name.clone(),
                body,
                override_body: None,
                decl_range: Some(range),
            });
        }
    }

    Ok(found)
}

/// `*.toml` files directly inside `dir`, sorted by name.
fn config_files(dir: &Path) -> Result<Vec<PathBuf>, Diagnostics> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Diagnostics::from(Diagnostic::error(
            DiagnosticKind::Config,
            "Failed to read configuration directory",
            format!("Could not list {}: {}", dir.display(), e),
        ))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().map_or(false, |ext| ext == CONFIG_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

fn header_line(content: &str, type_name: &str) -> Option<usize> {
    let plain = format!("[backend.{}]", type_name);
    let quoted = format!("[backend.\"{}\"]", type_name);
    content
        .lines()
        .position(|line| {
            let line = line.trim();
            line.starts_with(&plain) || line.starts_with(&quoted)
        })
        .map(|idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_no_files_means_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(load_declared(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_file_without_backend_block_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.toml"), "[variables]\nregion = \"eu\"\n").unwrap();
        assert!(load_declared(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_empty_block_is_present() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.toml"), "[backend.local]\n").unwrap();
        let config = load_declared(dir.path()).unwrap().unwrap();
        assert_eq!(config.type_name, "local");
        assert!(config.body.is_empty());
    }

    #[test]
    fn test_block_body_and_line() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.toml"),
            "# state\n\n[backend.http]\naddress = \"https://x\"\nretry_max = 3\n",
        )
        .unwrap();
        let config = load_declared(dir.path()).unwrap().unwrap();
        assert_eq!(config.type_name, "http");
        assert_eq!(
            Value::Object(config.body),
            json!({"address": "https://x", "retry_max": 3})
        );
        assert_eq!(config.decl_range.unwrap().line, Some(3));
    }

    #[test]
    fn test_block_datetime_and_non_finite_values() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.toml"), "[backend.inmem]\nlock_id = 2024-01-01\n").unwrap();
        let config = load_declared(dir.path()).unwrap().unwrap();
        assert_eq!(Value::Object(config.body), json!({"lock_id": "2024-01-01"}));

        fs::write(dir.path().join("main.toml"), "[backend.http]\nretry_max = inf\n").unwrap();
        let diags = load_declared(dir.path()).unwrap_err();
        let diag = diags.first_error().unwrap();
        assert_eq!(diag.summary, "Invalid backend block");
        assert_eq!(diag.subject.as_ref().unwrap().line, Some(1));
    }

    #[test]
    fn test_duplicate_blocks_across_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), "[backend.local]\n").unwrap();
        fs::write(dir.path().join("b.toml"), "[backend.inmem]\n").unwrap();
        let diags = load_declared(dir.path()).unwrap_err();
        let diag = diags.first_error().unwrap();
        assert_eq!(diag.summary, "Duplicate backend configuration");
        assert!(diag.detail.contains("a.toml"));
        assert!(diag.subject.as_ref().unwrap().filename.ends_with("b.toml"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.toml"), "[backend.local\n").unwrap();
        let diags = load_declared(dir.path()).unwrap_err();
        assert!(diags.has_kind(DiagnosticKind::Config));
    }

    #[test]
    fn test_merged_body_prefers_override() {
        let body = json!({"address": "a", "path": "p"}).as_object().cloned().unwrap();
        let overrides = json!({"address": "b"}).as_object().cloned().unwrap();
        let config = BackendConfig::new("http", body).with_override(overrides);
        assert!(config.has_override());
        assert_eq!(Value::Object(config.merged_body()), json!({"address": "b", "path": "p"}));
    }
}
