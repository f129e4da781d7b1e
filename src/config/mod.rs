//! Declared backend configuration.
//!
//! [`ConfigResolver`] turns an explicit configuration, or the block declared in
//! the working directory, plus an optional override body into a merged body
//! and its [`Fingerprint`].

mod declared;
mod fingerprint;
mod merge;
mod value;

use std::path::{Path, PathBuf};

pub use declared::{load_declared, BackendConfig, CONFIG_EXTENSION};
pub use fingerprint::Fingerprint;
pub use merge::{merge_bodies, parse_override_args};

use crate::backend::{BackendRegistry, ConfigBody};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};

/// A declared configuration whose type is known and whose body has been
/// merged with any override.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: BackendConfig,
    pub merged: ConfigBody,
    pub fingerprint: Fingerprint,
}

impl ResolvedConfig {
    pub fn type_name(&self) -> &str {
        &self.config.type_name
    }

    pub fn has_override(&self) -> bool {
        self.config.has_override()
    }
}

pub struct ConfigResolver<'a> {
    working_dir: PathBuf,
    registry: &'a BackendRegistry,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(working_dir: &Path, registry: &'a BackendRegistry) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            registry,
        }
    }

    /// Resolve the configuration to use.
    ///
    /// Without an explicit configuration the working directory is scanned.
    /// `Ok(None)` means no backend is declared anywhere.
    pub fn resolve(
        &self,
        explicit: Option<BackendConfig>,
        override_body: Option<ConfigBody>,
    ) -> Result<Option<ResolvedConfig>, Diagnostics> {
        let mut config = match explicit {
            Some(config) => config,
            None => match load_declared(&self.working_dir)? {
                Some(config) => {
                    tracing::trace!(
                        backend_type = %config.type_name,
                        "No explicit backend config, using declared block"
                    );
                    config
                }
                None => {
                    tracing::trace!("No backend config given or declared");
                    return Ok(None);
                }
            },
        };

        if !self.registry.contains(&config.type_name) {
            let mut diag = Diagnostic::error(
                DiagnosticKind::Config,
                "Invalid backend type",
                format!("There is no backend type named {:?}.", config.type_name),
            );
            if let Some(range) = &config.decl_range {
                diag = diag.with_subject(range.clone());
            }
            return Err(diag.into());
        }

        if let Some(overrides) = override_body {
            tracing::trace!("Merging override arguments into backend configuration");
            config.override_body = Some(overrides);
        }

        let merged = config.merged_body();
        let fingerprint = Fingerprint::compute(&config.type_name, &merged);
        tracing::trace!(
            backend_type = %config.type_name,
            fingerprint = %fingerprint,
            "Built backend configuration"
        );

        Ok(Some(ResolvedConfig {
            config,
            merged,
            fingerprint,
        }))
    }
}
