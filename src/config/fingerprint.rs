use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::backend::ConfigBody;

/// Cheap comparable digest of a backend type and configuration body.
///
/// Equal fingerprints let resolution skip decoding; unequal ones fall back to
/// comparing decoded values, which stays the authoritative check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const ZERO: Fingerprint = Fingerprint(0);

    /// First 8 bytes of SHA-256 over the type name and the canonical JSON of
    /// the body. Object keys serialize in sorted order, so key order in the
    /// source file does not matter.
    pub fn compute(type_name: &str, body: &ConfigBody) -> Self {
        let canonical = Value::Object(body.clone()).to_string();

        let mut hasher = Sha256::new();
        hasher.update(type_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(prefix))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
