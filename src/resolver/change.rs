use crate::backend::BackendRegistry;
use crate::config::ResolvedConfig;
use crate::record::CachedBackend;

/// Decides whether a live configuration differs materially from the cached
/// record.
///
/// Any configuration or record that cannot be decoded counts as changed, so
/// the migration path reports the underlying problem.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    decode_passes: usize,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a live configuration has been decoded for comparison.
    pub fn decode_passes(&self) -> usize {
        self.decode_passes
    }

    pub fn needs_migration(
        &mut self,
        registry: &BackendRegistry,
        live: &ResolvedConfig,
        cached: Option<&CachedBackend>,
    ) -> bool {
        let Some(cached) = cached.filter(|c| !c.is_empty()) else {
            tracing::trace!("No cached backend config, so migration is required");
            return true;
        };

        if live.type_name() != cached.type_name {
            tracing::trace!(
                from = %cached.type_name,
                to = %live.type_name(),
                "Backend type changed, so migration is required"
            );
            return true;
        }

        let Some(backend) = registry.instantiate(live.type_name()) else {
            tracing::trace!(
                backend_type = %live.type_name(),
                "No backend of this type; the migration path must handle it"
            );
            return true;
        };
        let schema = backend.config_schema();

        self.decode_passes += 1;
        let given = match schema.decode_none_required(&live.merged) {
            Ok(value) => value,
            Err(e) => {
                tracing::trace!(error = %e, "Failed to decode given config; the migration path must handle it");
                return true;
            }
        };

        let saved = match cached.config(&schema) {
            Ok(value) => value,
            Err(e) => {
                tracing::trace!(error = %e, "Failed to decode cached config; the migration path must handle it");
                return true;
            }
        };

        if saved == given {
            tracing::trace!("Given configuration matches cached configuration, so no migration is required");
            false
        } else {
            tracing::trace!("Configuration values have changed, so migration is required");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ConfigBody;
    use crate::config::{BackendConfig, Fingerprint};
    use serde_json::{json, Value};
    use std::path::Path;

    fn live(type_name: &str, body: Value) -> ResolvedConfig {
        let body: ConfigBody = body.as_object().cloned().unwrap();
        ResolvedConfig {
            fingerprint: Fingerprint::compute(type_name, &body),
            merged: body.clone(),
            config: BackendConfig::new(type_name, body),
        }
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::with_builtins(Path::new("."))
    }

    #[test]
    fn test_missing_or_cleared_record_needs_migration() {
        let mut detector = ChangeDetector::new();
        let config = live("local", json!({}));
        assert!(detector.needs_migration(&registry(), &config, None));

        let cleared = CachedBackend::new("", Value::Null, Fingerprint::ZERO);
        assert!(detector.needs_migration(&registry(), &config, Some(&cleared)));
        assert_eq!(detector.decode_passes(), 0);
    }

    #[test]
    fn test_type_change_needs_migration() {
        let mut detector = ChangeDetector::new();
        let cached = CachedBackend::new("inmem", json!({"lock_id": null}), Fingerprint::ZERO);
        assert!(detector.needs_migration(&registry(), &live("local", json!({})), Some(&cached)));
    }

    #[test]
    fn test_equal_decoded_values_need_no_migration() {
        let mut detector = ChangeDetector::new();
        // Explicit null and absent attributes decode to the same value.
        let cached = CachedBackend::new(
            "local",
            json!({"path": "a.tfstate", "workspace_dir": null}),
            Fingerprint::from_u64(1),
        );
        let config = live("local", json!({"path": "a.tfstate"}));
        assert!(!detector.needs_migration(&registry(), &config, Some(&cached)));
        assert_eq!(detector.decode_passes(), 1);
    }

    #[test]
    fn test_changed_value_needs_migration() {
        let mut detector = ChangeDetector::new();
        let cached = CachedBackend::new("local", json!({"path": "a.tfstate"}), Fingerprint::ZERO);
        let config = live("local", json!({"path": "b.tfstate"}));
        assert!(detector.needs_migration(&registry(), &config, Some(&cached)));
    }

    #[test]
    fn test_undecodable_inputs_are_conservative() {
        let mut detector = ChangeDetector::new();
        let cached = CachedBackend::new("local", json!({"path": "a.tfstate"}), Fingerprint::ZERO);

        let bad_live = live("local", json!({"bucket": "x"}));
        assert!(detector.needs_migration(&registry(), &bad_live, Some(&cached)));

        let bad_cached = CachedBackend::new("local", json!({"path": 7}), Fingerprint::ZERO);
        let config = live("local", json!({"path": "a.tfstate"}));
        assert!(detector.needs_migration(&registry(), &config, Some(&bad_cached)));
    }

    #[test]
    fn test_unknown_type_is_conservative() {
        let mut detector = ChangeDetector::new();
        let cached = CachedBackend::new("s3", json!({}), Fingerprint::ZERO);
        assert!(detector.needs_migration(&registry(), &live("s3", json!({})), Some(&cached)));
        assert_eq!(detector.decode_passes(), 0);
    }
}
