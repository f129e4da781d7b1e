//! Override bodies supplied on the command line.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::backend::ConfigBody;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, SourceRange};

use super::value::{table_to_body, to_json, ConvertError};

/// Merge `overrides` onto `base`; override values win per key.
pub fn merge_bodies(base: &ConfigBody, overrides: &ConfigBody) -> ConfigBody {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Build an override body from `-backend-config` style arguments.
///
/// Each argument is either `key=value` or the path of a TOML file whose
/// top-level keys are merged in. Later arguments win. Values in `key=value`
/// pairs are parsed as TOML scalars when possible and kept as strings
/// otherwise, so `retry_max=3` is a number and `address=https://x` a string.
/// Decoding converts scalars to the attribute's kind, so `lock_id=123` still
/// sets a string attribute.
pub fn parse_override_args(args: &[String], working_dir: &Path) -> Result<ConfigBody, Diagnostics> {
    let mut body = ConfigBody::new();

    for arg in args {
        if let Some((key, raw)) = arg.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                return Err(Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid backend configuration argument",
                    format!("The given value {:?} is not a valid key=value pair.", arg),
                )
                .into());
            }
            let value = parse_scalar(key, raw).map_err(|e| {
                Diagnostics::from(Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid backend configuration argument",
                    e.to_string(),
                ))
            })?;
            body.insert(key.to_string(), value);
            continue;
        }

        let path = working_dir.join(arg);
        let content = fs::read_to_string(&path).map_err(|e| {
            Diagnostics::from(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid backend configuration file",
                    format!("Failed to read {}: {}", path.display(), e),
                )
                .with_subject(SourceRange::file(&path)),
            )
        })?;
        let table: toml::Table = toml::from_str(&content).map_err(|e| {
            Diagnostics::from(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid backend configuration file",
                    format!("Failed to parse {}: {}", path.display(), e),
                )
                .with_subject(SourceRange::file(&path)),
            )
        })?;
        let map = table_to_body(table).map_err(|e| {
            Diagnostics::from(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid backend configuration file",
                    format!("{}: {}", path.display(), e),
                )
                .with_subject(SourceRange::file(&path)),
            )
        })?;
        body = merge_bodies(&body, &map);
    }

    tracing::trace!(keys = body.len(), "Parsed backend config overrides");
    Ok(body)
}

fn parse_scalar(key: &str, raw: &str) -> Result<Value, ConvertError> {
    let parsed = toml::from_str::<toml::Table>(&format!("v = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("v"));
    match parsed {
        Some(value) => to_json(value, key),
        None => Ok(Value::String(raw.to_string())),
    }
}
