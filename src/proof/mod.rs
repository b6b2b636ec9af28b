//! Proof verification registry
//!
//! A name-keyed table of verification callbacks, dispatched on demand to
//! validate proof blobs attached to operations. Registries are ordinary
//! owned objects, but database handles and the C boundary all share the
//! [`shared_registry`] instance so a verifier registered anywhere in the
//! process is visible to every transaction. Registrations are
//! process-lifetime at most and never persisted.
//!
//! A proof blob is JSON: `{"type": <name>, "data": <base64>}`. The
//! registry dispatches on `type` and hands the decoded `data` bytes to
//! the matching verifier.

pub mod error;

pub use error::{ProofError, ProofResult};

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use serde::Deserialize;

/// Names of the built-in evidence verifiers
pub const BUILTIN_VERIFIERS: [&str; 3] = ["fd-holds", "normalization", "denormalization"];

static SHARED: LazyLock<Arc<ProofRegistry>> = LazyLock::new(|| {
    let registry = Arc::new(ProofRegistry::new());
    registry.init_builtins();
    registry
});

/// The process-wide registry shared by database handles and the C
/// boundary. Builtins are installed on first use.
pub fn shared_registry() -> Arc<ProofRegistry> {
    SHARED.clone()
}

/// A verification callback for one proof type
pub trait ProofVerifier: Send + Sync {
    /// Validate the decoded proof data; `true` means the proof holds
    fn verify(&self, data: &[u8]) -> bool;
}

impl<F> ProofVerifier for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn verify(&self, data: &[u8]) -> bool {
        self(data)
    }
}

#[derive(Deserialize)]
struct ProofBlob {
    #[serde(rename = "type")]
    proof_type: String,
    data: String,
}

/// Name-keyed verifier table
#[derive(Default)]
pub struct ProofRegistry {
    verifiers: RwLock<HashMap<String, Box<dyn ProofVerifier>>>,
}

impl ProofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verifier under `name`, replacing any prior registration.
    pub fn register(&self, name: impl Into<String>, verifier: Box<dyn ProofVerifier>) {
        let name = name.into();
        tracing::debug!(name = %name, "registered proof verifier");
        self.verifiers.write().insert(name, verifier);
    }

    /// Remove the verifier registered under `name`.
    ///
    /// Unregistering an absent name is a reported error, and stays one on
    /// every repeated attempt.
    pub fn unregister(&self, name: &str) -> ProofResult<()> {
        match self.verifiers.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(ProofError::NotRegistered(name.to_string())),
        }
    }

    /// Whether a verifier is currently registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.verifiers.read().contains_key(name)
    }

    /// Dispatch a proof blob to its matching verifier.
    pub fn verify(&self, proof_blob: &[u8]) -> ProofResult<bool> {
        let blob: ProofBlob = serde_json::from_slice(proof_blob)
            .map_err(|e| ProofError::InvalidProof(format!("not a valid proof record: {e}")))?;

        let data = BASE64
            .decode(&blob.data)
            .map_err(|e| ProofError::InvalidProof(format!("data is not valid base64: {e}")))?;

        let verifiers = self.verifiers.read();
        let verifier = verifiers
            .get(&blob.proof_type)
            .ok_or_else(|| ProofError::UnknownType(blob.proof_type.clone()))?;

        Ok(verifier.verify(&data))
    }

    /// Register the built-in evidence verifiers. Safe to call repeatedly;
    /// re-registration simply overwrites.
    pub fn init_builtins(&self) {
        for name in BUILTIN_VERIFIERS {
            self.register(name, Box::new(builtin_structural));
        }
    }
}

/// Built-in structural check shared by the evidence verifiers: the
/// decoded data must be non-empty, and when it parses as JSON it must be
/// an object or array (an evidence record, not a bare scalar).
fn builtin_structural(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(value) => value.is_object() || value.is_array(),
        // Opaque non-JSON evidence is accepted on structure alone.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(proof_type: &str, data: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": proof_type,
            "data": BASE64.encode(data),
        }))
        .unwrap()
    }

    #[test]
    fn test_register_unregister_cycle() {
        let registry = ProofRegistry::new();
        registry.register("custom", Box::new(|_: &[u8]| true));
        assert!(registry.contains("custom"));

        registry.unregister("custom").unwrap();
        assert!(!registry.contains("custom"));

        // Second unregister is an idempotently reported failure
        assert!(matches!(
            registry.unregister("custom"),
            Err(ProofError::NotRegistered(_))
        ));
        assert!(matches!(
            registry.unregister("custom"),
            Err(ProofError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_register_overwrites() {
        let registry = ProofRegistry::new();
        registry.register("flip", Box::new(|_: &[u8]| false));
        assert!(!registry.verify(&proof("flip", b"x")).unwrap());

        registry.register("flip", Box::new(|_: &[u8]| true));
        assert!(registry.verify(&proof("flip", b"x")).unwrap());
    }

    #[test]
    fn test_builtins_accept_opaque_evidence() {
        let registry = ProofRegistry::new();
        registry.init_builtins();
        registry.init_builtins(); // idempotent

        for name in BUILTIN_VERIFIERS {
            assert!(registry.verify(&proof(name, b"test")).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_builtin_rejects_empty_evidence() {
        let registry = ProofRegistry::new();
        registry.init_builtins();
        assert!(!registry.verify(&proof("fd-holds", b"")).unwrap());
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let registry = ProofRegistry::new();
        registry.init_builtins();
        assert!(matches!(
            registry.verify(&proof("no-such-evidence", b"x")),
            Err(ProofError::UnknownType(_))
        ));
    }

    #[test]
    fn test_malformed_blob_is_invalid_proof() {
        let registry = ProofRegistry::new();
        assert!(matches!(
            registry.verify(b"not json"),
            Err(ProofError::InvalidProof(_))
        ));
        assert!(matches!(
            registry.verify(br#"{"type":"fd-holds","data":"%%%"}"#),
            Err(ProofError::InvalidProof(_))
        ));
    }
}
