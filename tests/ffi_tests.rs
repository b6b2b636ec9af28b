//! Integration tests for the C ABI surface

use std::os::raw::{c_int, c_void};

use formbd::ffi::{
    fdb_apply, fdb_blob_free, fdb_db_close, fdb_db_open, fdb_delete_block,
    fdb_introspect_schema, fdb_proof_init_builtins, fdb_proof_register_verifier,
    fdb_proof_unregister_verifier, fdb_proof_verify, fdb_read_blocks, fdb_render_block,
    fdb_render_journal, fdb_txn_abort, fdb_txn_begin, fdb_txn_commit, fdb_update_block,
    fdb_version, FdbDb, FdbTxn, LgBlob, LgRenderOpts, FDB_ERR_INVALID_ARGUMENT,
    FDB_ERR_NOT_FOUND, FDB_OK, LG_TXN_READ_ONLY, LG_TXN_READ_WRITE,
};

fn blob_str(blob: &LgBlob) -> String {
    if blob.ptr.is_null() {
        return String::new();
    }
    let bytes = unsafe { std::slice::from_raw_parts(blob.ptr, blob.len) };
    String::from_utf8(bytes.to_vec()).unwrap()
}

unsafe fn open_db(dir: &tempfile::TempDir) -> *mut FdbDb {
    let path = dir.path().join("db.fdb");
    let path = path.to_str().unwrap();
    let mut db: *mut FdbDb = std::ptr::null_mut();
    let mut err = LgBlob::empty();
    let status = fdb_db_open(
        path.as_ptr(),
        path.len(),
        std::ptr::null(),
        0,
        &mut db,
        &mut err,
    );
    assert_eq!(status, FDB_OK, "open failed: {}", blob_str(&err));
    db
}

unsafe fn begin_rw(db: *mut FdbDb) -> *mut FdbTxn {
    let mut txn: *mut FdbTxn = std::ptr::null_mut();
    let mut err = LgBlob::empty();
    assert_eq!(fdb_txn_begin(db, LG_TXN_READ_WRITE, &mut txn, &mut err), FDB_OK);
    txn
}

unsafe fn apply(txn: *mut FdbTxn, op: &str) -> u64 {
    let mut result = fdb_apply(txn, op.as_ptr(), op.len());
    assert_eq!(result.status, FDB_OK, "apply failed: {}", blob_str(&result.error_blob));
    let data: serde_json::Value = serde_json::from_str(&blob_str(&result.data)).unwrap();
    fdb_blob_free(&mut result.data);
    fdb_blob_free(&mut result.provenance);
    data["block_id"].as_u64().unwrap()
}

#[test]
fn test_version_packs_major_minor_patch() {
    assert_eq!(fdb_version(), 100);
}

#[test]
fn test_blob_free_tolerates_null_and_empty() {
    unsafe {
        fdb_blob_free(std::ptr::null_mut());
        let mut empty = LgBlob::empty();
        fdb_blob_free(&mut empty);
        fdb_blob_free(&mut empty);
    }
}

#[test]
fn test_open_write_read_cycle() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        let db = open_db(&dir);

        let txn = begin_rw(db);
        let id = apply(txn, r#"{"title":"via ffi"}"#);
        let mut err = LgBlob::empty();
        assert_eq!(fdb_txn_commit(txn, &mut err), FDB_OK);

        let mut data = LgBlob::empty();
        assert_eq!(fdb_read_blocks(db, 0x0011, &mut data, &mut err), FDB_OK);
        let v: serde_json::Value = serde_json::from_str(&blob_str(&data)).unwrap();
        assert_eq!(v[0]["block_id"], id);
        assert_eq!(v[0]["data"]["title"], "via ffi");
        fdb_blob_free(&mut data);

        assert_eq!(fdb_db_close(db), FDB_OK);
    }
}

#[test]
fn test_update_and_delete_entry_points() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        let db = open_db(&dir);
        let mut err = LgBlob::empty();

        let txn = begin_rw(db);
        let id = apply(txn, r#"{"v":1}"#);
        assert_eq!(fdb_txn_commit(txn, &mut err), FDB_OK);

        let txn = begin_rw(db);
        let doc = r#"{"v":2}"#;
        assert_eq!(
            fdb_update_block(txn, id, doc.as_ptr(), doc.len(), &mut err),
            FDB_OK
        );
        assert_eq!(fdb_txn_commit(txn, &mut err), FDB_OK);

        let txn = begin_rw(db);
        assert_eq!(fdb_delete_block(txn, id, &mut err), FDB_OK);
        assert_eq!(fdb_txn_commit(txn, &mut err), FDB_OK);

        let mut data = LgBlob::empty();
        assert_eq!(fdb_read_blocks(db, 0x0011, &mut data, &mut err), FDB_OK);
        assert_eq!(blob_str(&data), "[]");
        fdb_blob_free(&mut data);

        fdb_db_close(db);
    }
}

#[test]
fn test_read_only_txn_rejects_apply() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        let db = open_db(&dir);
        let mut txn: *mut FdbTxn = std::ptr::null_mut();
        let mut err = LgBlob::empty();
        assert_eq!(fdb_txn_begin(db, LG_TXN_READ_ONLY, &mut txn, &mut err), FDB_OK);

        let op = r#"{"title":"nope"}"#;
        let mut result = fdb_apply(txn, op.as_ptr(), op.len());
        assert_ne!(result.status, FDB_OK);
        fdb_blob_free(&mut result.error_blob);

        assert_eq!(fdb_txn_abort(txn), FDB_OK);
        fdb_db_close(db);
    }
}

#[test]
fn test_render_and_journal_entry_points() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        let db = open_db(&dir);
        let mut err = LgBlob::empty();

        let txn = begin_rw(db);
        let id = apply(txn, r#"{"title":"rendered"}"#);
        assert_eq!(fdb_txn_commit(txn, &mut err), FDB_OK);

        let opts = LgRenderOpts {
            format: 0,
            include_metadata: true,
        };
        let mut text = LgBlob::empty();
        assert_eq!(fdb_render_block(db, id, opts, &mut text, &mut err), FDB_OK);
        let v: serde_json::Value = serde_json::from_str(&blob_str(&text)).unwrap();
        assert_eq!(v["type"], "document");
        fdb_blob_free(&mut text);

        let mut journal = LgBlob::empty();
        assert_eq!(fdb_render_journal(db, 0, opts, &mut journal, &mut err), FDB_OK);
        let line: serde_json::Value =
            serde_json::from_str(blob_str(&journal).lines().next().unwrap()).unwrap();
        assert_eq!(line["entry"]["op"], "insert");
        fdb_blob_free(&mut journal);

        fdb_db_close(db);
    }
}

#[test]
fn test_introspect_schema_on_empty_store_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        let db = open_db(&dir);
        let mut schema = LgBlob::empty();
        let mut err = LgBlob::empty();
        assert_eq!(
            fdb_introspect_schema(db, &mut schema, &mut err),
            FDB_ERR_NOT_FOUND
        );
        assert!(!blob_str(&err).is_empty());
        fdb_blob_free(&mut err);
        fdb_db_close(db);
    }
}

#[test]
fn test_invalid_arguments_reported_without_touching_outputs() {
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        // Null out pointers
        assert_eq!(
            fdb_db_open(b"x".as_ptr(), 1, std::ptr::null(), 0, std::ptr::null_mut(), std::ptr::null_mut()),
            FDB_ERR_INVALID_ARGUMENT
        );

        let db = open_db(&dir);
        let mut txn: *mut FdbTxn = std::ptr::null_mut();
        let mut err = LgBlob::empty();

        // Unknown transaction mode
        assert_eq!(
            fdb_txn_begin(db, 99, &mut txn, &mut err),
            FDB_ERR_INVALID_ARGUMENT
        );
        assert!(txn.is_null());

        // Unknown block type tag
        let mut data = LgBlob::empty();
        assert_eq!(
            fdb_read_blocks(db, 0xFFFF, &mut data, &mut err),
            FDB_ERR_INVALID_ARGUMENT
        );
        assert!(data.ptr.is_null());

        fdb_db_close(db);
    }
}

// ============ Handle-less proof surface ============

unsafe extern "C" fn even_length_verifier(
    _ptr: *const u8,
    len: usize,
    _ctx: *mut c_void,
) -> c_int {
    if len % 2 == 0 {
        FDB_OK
    } else {
        1
    }
}

#[test]
fn test_proof_register_verify_unregister() {
    unsafe {
        assert_eq!(fdb_proof_init_builtins(), FDB_OK);

        let name = "ffi-even-length";
        assert_eq!(
            fdb_proof_register_verifier(
                name.as_ptr(),
                name.len(),
                Some(even_length_verifier),
                std::ptr::null_mut()
            ),
            FDB_OK
        );

        let blob = serde_json::json!({
            "type": name,
            "data": "YWI=", // "ab"
        })
        .to_string();
        let mut valid = false;
        let mut err = LgBlob::empty();
        assert_eq!(
            fdb_proof_verify(blob.as_ptr(), blob.len(), &mut valid, &mut err),
            FDB_OK
        );
        assert!(valid);

        let odd = serde_json::json!({
            "type": name,
            "data": "YWJj", // "abc"
        })
        .to_string();
        assert_eq!(
            fdb_proof_verify(odd.as_ptr(), odd.len(), &mut valid, &mut err),
            FDB_OK
        );
        assert!(!valid);

        assert_eq!(fdb_proof_unregister_verifier(name.as_ptr(), name.len()), FDB_OK);
        // Second unregister reports the absence
        assert_eq!(
            fdb_proof_unregister_verifier(name.as_ptr(), name.len()),
            FDB_ERR_NOT_FOUND
        );
    }
}

#[test]
fn test_null_callback_rejected() {
    unsafe {
        let name = "never-registered";
        assert_eq!(
            fdb_proof_register_verifier(name.as_ptr(), name.len(), None, std::ptr::null_mut()),
            FDB_ERR_INVALID_ARGUMENT
        );
    }
}
