use std::fmt;

use super::change::ChangeDetector;
use crate::backend::BackendRegistry;
use crate::config::ResolvedConfig;
use crate::record::CachedBackend;

/// The five ways a resolution can go, computed once per resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No declared config and no cached record: pure local.
    NoOp,
    /// The cached backend is no longer declared.
    Unconfigure,
    /// A backend is declared for the first time.
    FirstTime,
    /// Declared config matches the cached record.
    Unchanged,
    /// Declared config differs from the cached record.
    Reconfigure,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::NoOp => "no-op",
            Transition::Unconfigure => "unconfigure",
            Transition::FirstTime => "first-time",
            Transition::Unchanged => "unchanged",
            Transition::Reconfigure => "reconfigure",
        };
        f.write_str(name)
    }
}

/// Classify a resolution.
///
/// The fingerprint fast path applies when hashes match and either this is
/// not an init or no override was given; otherwise the detector compares
/// decoded values.
pub(crate) fn classify(
    live: Option<&ResolvedConfig>,
    cached: Option<&CachedBackend>,
    init: bool,
    registry: &BackendRegistry,
    detector: &mut ChangeDetector,
) -> Transition {
    let cached = cached.filter(|c| !c.is_empty());
    match (live, cached) {
        (None, None) => {
            tracing::trace!("No backend configuration and no initialized backend; using local state only");
            Transition::NoOp
        }
        (None, Some(cached)) => {
            tracing::trace!(
                backend_type = %cached.type_name,
                "Previously initialized backend is no longer present in config"
            );
            Transition::Unconfigure
        }
        (Some(live), None) => {
            tracing::trace!(
                backend_type = %live.type_name(),
                "Moving from local state only to a configured backend"
            );
            Transition::FirstTime
        }
        (Some(live), Some(cached)) => {
            if live.fingerprint == cached.hash && (!init || !live.has_override()) {
                tracing::trace!(
                    backend_type = %live.type_name(),
                    "Using already-initialized, unchanged backend configuration"
                );
                return Transition::Unchanged;
            }
            if !detector.needs_migration(registry, live, Some(cached)) {
                tracing::trace!(
                    backend_type = %live.type_name(),
                    "Using already-initialized backend configuration"
                );
                return Transition::Unchanged;
            }
            tracing::trace!(
                from = %cached.type_name,
                to = %live.type_name(),
                "Backend configuration has changed"
            );
            Transition::Reconfigure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ConfigBody;
    use crate::config::{BackendConfig, Fingerprint};
    use serde_json::json;
    use std::path::Path;

    fn live(path: &str, with_override: bool) -> ResolvedConfig {
        let body: ConfigBody = json!({"path": path}).as_object().cloned().unwrap();
        let mut config = BackendConfig::new("local", body.clone());
        if with_override {
            config = config.with_override(ConfigBody::new());
        }
        ResolvedConfig {
            fingerprint: Fingerprint::compute("local", &body),
            merged: body,
            config,
        }
    }

    fn cached_for(config: &ResolvedConfig) -> CachedBackend {
        CachedBackend::new(
            "local",
            json!({"path": config.merged["path"], "workspace_dir": null}),
            config.fingerprint,
        )
    }

    #[test]
    fn test_presence_cases() {
        let registry = BackendRegistry::with_builtins(Path::new("."));
        let mut detector = ChangeDetector::new();
        let config = live("a", false);
        let cached = cached_for(&config);

        assert_eq!(classify(None, None, false, &registry, &mut detector), Transition::NoOp);
        assert_eq!(
            classify(None, Some(&cached), false, &registry, &mut detector),
            Transition::Unconfigure
        );
        assert_eq!(
            classify(Some(&config), None, false, &registry, &mut detector),
            Transition::FirstTime
        );
    }

    #[test]
    fn test_fast_path_skips_decoding() {
        let registry = BackendRegistry::with_builtins(Path::new("."));
        let mut detector = ChangeDetector::new();
        let config = live("a", false);
        let cached = cached_for(&config);

        assert_eq!(
            classify(Some(&config), Some(&cached), true, &registry, &mut detector),
            Transition::Unchanged
        );
        assert_eq!(detector.decode_passes(), 0);
    }

    #[test]
    fn test_override_during_init_forces_comparison() {
        let registry = BackendRegistry::with_builtins(Path::new("."));
        let mut detector = ChangeDetector::new();
        let config = live("a", true);
        let cached = cached_for(&config);

        assert_eq!(
            classify(Some(&config), Some(&cached), true, &registry, &mut detector),
            Transition::Unchanged
        );
        assert_eq!(detector.decode_passes(), 1);

        // Outside init the override does not matter.
        assert_eq!(
            classify(Some(&config), Some(&cached), false, &registry, &mut detector),
            Transition::Unchanged
        );
        assert_eq!(detector.decode_passes(), 1);
    }

    #[test]
    fn test_changed_value_reconfigures() {
        let registry = BackendRegistry::with_builtins(Path::new("."));
        let mut detector = ChangeDetector::new();
        let cached = cached_for(&live("a", false));
        let config = live("b", false);

        assert_eq!(
            classify(Some(&config), Some(&cached), false, &registry, &mut detector),
            Transition::Reconfigure
        );
    }
}
