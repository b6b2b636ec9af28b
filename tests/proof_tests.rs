//! Integration tests for proof verification

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use formbd::proof::{ProofError, ProofRegistry, BUILTIN_VERIFIERS};
use formbd::txn::TxnError;
use formbd::{Database, TxnMode};

fn proof_blob(proof_type: &str, data: &[u8]) -> Vec<u8> {
    serde_json::json!({
        "type": proof_type,
        "data": BASE64.encode(data),
    })
    .to_string()
    .into_bytes()
}

#[test]
fn test_builtins_accept_structured_evidence() {
    let registry = ProofRegistry::new();
    registry.init_builtins();

    for name in BUILTIN_VERIFIERS {
        assert!(registry.contains(name));
        let blob = proof_blob(name, br#"{"witness":[1,2,3]}"#);
        assert!(registry.verify(&blob).unwrap());
    }
}

#[test]
fn test_builtins_reject_empty_evidence() {
    let registry = ProofRegistry::new();
    registry.init_builtins();

    let blob = proof_blob("fd-holds", b"");
    assert!(!registry.verify(&blob).unwrap());
}

#[test]
fn test_custom_verifier_dispatch() {
    let registry = ProofRegistry::new();
    registry.register("parity", Box::new(|data: &[u8]| data.len() % 2 == 0));

    assert!(registry.verify(&proof_blob("parity", b"ab")).unwrap());
    assert!(!registry.verify(&proof_blob("parity", b"abc")).unwrap());
}

#[test]
fn test_unknown_type_is_an_error_not_a_rejection() {
    let registry = ProofRegistry::new();
    registry.init_builtins();

    match registry.verify(&proof_blob("no-such-proof", b"x")) {
        Err(ProofError::UnknownType(name)) => assert_eq!(name, "no-such-proof"),
        other => panic!("expected UnknownType, got {other:?}"),
    }
}

#[test]
fn test_malformed_blob_is_invalid() {
    let registry = ProofRegistry::new();
    registry.init_builtins();

    assert!(matches!(
        registry.verify(b"not json at all"),
        Err(ProofError::InvalidProof(_))
    ));
    // Wrong shape: missing data field
    assert!(matches!(
        registry.verify(br#"{"type":"fd-holds"}"#),
        Err(ProofError::InvalidProof(_))
    ));
    // data is not base64
    assert!(matches!(
        registry.verify(br#"{"type":"fd-holds","data":"!!!"}"#),
        Err(ProofError::InvalidProof(_))
    ));
}

#[test]
fn test_unregister_then_unregister_again() {
    let registry = ProofRegistry::new();
    registry.register("once", Box::new(|_: &[u8]| true));

    registry.unregister("once").unwrap();
    assert!(matches!(
        registry.unregister("once"),
        Err(ProofError::NotRegistered(_))
    ));
}

#[test]
fn test_init_builtins_resets_shadowed_builtin() {
    let registry = ProofRegistry::new();
    registry.init_builtins();
    registry.register("fd-holds", Box::new(|_: &[u8]| false));
    assert!(!registry.verify(&proof_blob("fd-holds", br#"{"a":1}"#)).unwrap());

    registry.init_builtins();
    assert!(registry.verify(&proof_blob("fd-holds", br#"{"a":1}"#)).unwrap());
}

// ============ Proofs attached to operations ============

#[test]
fn test_operation_with_valid_proof_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("db.fdb")).unwrap();

    let op = serde_json::json!({
        "op": "insert",
        "doc": {"title": "attested"},
        "proof": {"type": "fd-holds", "data": BASE64.encode(br#"{"fd":"ok"}"#)},
    });

    let mut txn = db.begin(TxnMode::ReadWrite);
    txn.apply_json(op.to_string().as_bytes()).unwrap();
    txn.commit().unwrap();

    assert_eq!(
        db.read_blocks(formbd::BlockType::Document).unwrap().len(),
        1
    );
}

#[test]
fn test_operation_with_failing_proof_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("db.fdb")).unwrap();

    // Registered process-wide, so visible to this handle's transactions
    db.registry()
        .register("always-no", Box::new(|_: &[u8]| false));

    let op = serde_json::json!({
        "op": "insert",
        "doc": {"title": "unattested"},
        "proof": {"type": "always-no", "data": BASE64.encode(b"x")},
    });

    let mut txn = db.begin(TxnMode::ReadWrite);
    match txn.apply_json(op.to_string().as_bytes()) {
        Err(TxnError::ProofRejected(name)) => assert_eq!(name, "always-no"),
        other => panic!("expected ProofRejected, got {other:?}"),
    }
    txn.commit().unwrap();

    assert!(db.read_blocks(formbd::BlockType::Document).unwrap().is_empty());
}
