//! Stable C ABI
//!
//! The single entry point every other language binds against. The
//! surface is a frozen contract: symbol names, struct layout, and status
//! numbering must stay bit-stable across implementations.
//!
//! Conventions:
//! - handles ([`FdbDb`], [`FdbTxn`]) are opaque and only ever passed
//!   back in; `fdb_txn_commit` / `fdb_txn_abort` consume the transaction
//!   handle (a transaction is destroyed on commit or abort)
//! - every outgoing byte buffer is an [`LgBlob`] whose memory the caller
//!   owns and must release through [`fdb_blob_free`]; freeing a
//!   null/empty blob is a guaranteed no-op
//! - every error path that produces an error blob allocates it the same
//!   way, so one free routine covers everything

#![allow(unsafe_code, clippy::missing_safety_doc)]

use std::os::raw::{c_int, c_void};
use std::sync::{Arc, LazyLock};

use crate::block::{BlockId, BlockType};
use crate::db::Database;
use crate::error::{DbError, Status};
use crate::introspect::{RenderFormat, RenderOpts};
use crate::proof::{ProofRegistry, ProofVerifier};
use crate::txn::{Transaction, TxnMode};

// ── Status codes ────────────────────────────────────────────────────

pub const FDB_OK: c_int = Status::Ok as c_int;
pub const FDB_ERR_INTERNAL: c_int = Status::Internal as c_int;
pub const FDB_ERR_NOT_FOUND: c_int = Status::NotFound as c_int;
pub const FDB_ERR_INVALID_ARGUMENT: c_int = Status::InvalidArgument as c_int;
pub const FDB_ERR_OUT_OF_MEMORY: c_int = Status::OutOfMemory as c_int;
pub const FDB_ERR_NOT_IMPLEMENTED: c_int = Status::NotImplemented as c_int;
pub const FDB_ERR_TXN_NOT_ACTIVE: c_int = Status::TxnNotActive as c_int;
pub const FDB_ERR_TXN_ALREADY_COMMITTED: c_int = Status::TxnAlreadyCommitted as c_int;
pub const FDB_ERR_IO_ERROR: c_int = Status::IoError as c_int;
pub const FDB_ERR_CORRUPTION: c_int = Status::Corruption as c_int;
pub const FDB_ERR_CONFLICT: c_int = Status::Conflict as c_int;
pub const FDB_ERR_ALREADY_EXISTS: c_int = Status::AlreadyExists as c_int;

// ── Boundary types ──────────────────────────────────────────────────

/// Owned byte buffer crossing the boundary as a `(pointer, length)` pair
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LgBlob {
    pub ptr: *const u8,
    pub len: usize,
}

impl LgBlob {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
        }
    }
}

/// Result of `fdb_apply`: data + provenance + status + error
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LgResult {
    pub data: LgBlob,
    pub provenance: LgBlob,
    pub status: c_int,
    pub error_blob: LgBlob,
}

/// Render options for the introspection entry points
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LgRenderOpts {
    /// 0 = JSON
    pub format: c_int,
    pub include_metadata: bool,
}

/// Transaction mode values at the boundary
pub const LG_TXN_READ_ONLY: c_int = 0;
pub const LG_TXN_READ_WRITE: c_int = 1;

/// Proof verifier callback: returns a status code, `FDB_OK` = valid
pub type LgProofVerifier =
    unsafe extern "C" fn(proof_ptr: *const u8, proof_len: usize, context: *mut c_void) -> c_int;

/// Opaque database handle
pub struct FdbDb {
    db: Database,
}

/// Opaque transaction handle
pub struct FdbTxn {
    txn: Transaction,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn blob_from_vec(v: Vec<u8>) -> LgBlob {
    if v.is_empty() {
        return LgBlob::empty();
    }
    let boxed = v.into_boxed_slice();
    let len = boxed.len();
    let ptr = Box::into_raw(boxed) as *const u8;
    LgBlob { ptr, len }
}

fn blob_from_string(s: String) -> LgBlob {
    blob_from_vec(s.into_bytes())
}

unsafe fn write_blob(out: *mut LgBlob, blob: LgBlob) {
    if !out.is_null() {
        *out = blob;
    }
}

unsafe fn report(out_err: *mut LgBlob, err: &DbError) -> c_int {
    write_blob(out_err, blob_from_string(err.to_string()));
    err.status() as c_int
}

unsafe fn input_slice<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if ptr.is_null() {
        if len == 0 {
            Some(&[])
        } else {
            None
        }
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

fn render_opts(opts: &LgRenderOpts) -> RenderOpts {
    RenderOpts {
        format: RenderFormat::Json,
        include_metadata: opts.include_metadata,
    }
}

/// Process-wide registry behind the handle-less `fdb_proof_*` entry
/// points. The same instance backs every database handle, so verifiers
/// registered here apply to transactions too.
static GLOBAL_REGISTRY: LazyLock<Arc<ProofRegistry>> = LazyLock::new(crate::proof::shared_registry);

/// Adapter for C callback verifiers registered through the boundary.
struct ForeignVerifier {
    callback: LgProofVerifier,
    context: *mut c_void,
}

// The caller guarantees the callback and context are usable from any
// thread; the boundary documents rather than enforces that discipline.
unsafe impl Send for ForeignVerifier {}
unsafe impl Sync for ForeignVerifier {}

impl ProofVerifier for ForeignVerifier {
    fn verify(&self, data: &[u8]) -> bool {
        let status = unsafe { (self.callback)(data.as_ptr(), data.len(), self.context) };
        status == FDB_OK
    }
}

// ── Database lifecycle ──────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_db_open(
    path_ptr: *const u8,
    path_len: usize,
    _opts_ptr: *const u8,
    _opts_len: usize,
    out_db: *mut *mut FdbDb,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if out_db.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    *out_db = std::ptr::null_mut();

    let Some(path_bytes) = input_slice(path_ptr, path_len) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    let Ok(path) = std::str::from_utf8(path_bytes) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    if path.is_empty() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    match Database::open(path) {
        Ok(db) => {
            *out_db = Box::into_raw(Box::new(FdbDb { db }));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_db_close(db: *mut FdbDb) -> c_int {
    if db.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    let handle = Box::from_raw(db);
    match handle.db.close() {
        Ok(()) => FDB_OK,
        Err(e) => e.status() as c_int,
    }
}

// ── Transactions ────────────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_txn_begin(
    db: *mut FdbDb,
    mode: c_int,
    out_txn: *mut *mut FdbTxn,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if db.is_null() || out_txn.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    *out_txn = std::ptr::null_mut();

    let mode = match mode {
        LG_TXN_READ_ONLY => TxnMode::ReadOnly,
        LG_TXN_READ_WRITE => TxnMode::ReadWrite,
        _ => return FDB_ERR_INVALID_ARGUMENT,
    };

    let txn = (*db).db.begin(mode);
    *out_txn = Box::into_raw(Box::new(FdbTxn { txn }));
    FDB_OK
}

#[no_mangle]
pub unsafe extern "C" fn fdb_txn_commit(txn: *mut FdbTxn, out_err: *mut LgBlob) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if txn.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    let mut handle = Box::from_raw(txn);
    match handle.txn.commit() {
        Ok(()) => FDB_OK,
        Err(e) => report(out_err, &e.into()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_txn_abort(txn: *mut FdbTxn) -> c_int {
    if txn.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    let mut handle = Box::from_raw(txn);
    match handle.txn.abort() {
        Ok(()) => FDB_OK,
        Err(e) => DbError::from(e).status() as c_int,
    }
}

// ── Operations ──────────────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_apply(txn: *mut FdbTxn, op_ptr: *const u8, op_len: usize) -> LgResult {
    let mut result = LgResult {
        data: LgBlob::empty(),
        provenance: LgBlob::empty(),
        status: FDB_OK,
        error_blob: LgBlob::empty(),
    };

    if txn.is_null() {
        result.status = FDB_ERR_INVALID_ARGUMENT;
        return result;
    }
    let Some(op_bytes) = input_slice(op_ptr, op_len) else {
        result.status = FDB_ERR_INVALID_ARGUMENT;
        return result;
    };

    match (*txn).txn.apply_json(op_bytes) {
        Ok(applied) => {
            let data = serde_json::json!({ "block_id": applied.block_id });
            result.data = blob_from_string(data.to_string());
            result.provenance = blob_from_string(applied.provenance.to_string());
        }
        Err(e) => {
            let e: DbError = e.into();
            result.status = e.status() as c_int;
            result.error_blob = blob_from_string(e.to_string());
        }
    }
    result
}

#[no_mangle]
pub unsafe extern "C" fn fdb_update_block(
    txn: *mut FdbTxn,
    block_id: u64,
    data_ptr: *const u8,
    data_len: usize,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if txn.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    let Some(data) = input_slice(data_ptr, data_len) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };

    match (*txn).txn.update(block_id as BlockId, data.to_vec()) {
        Ok(()) => FDB_OK,
        Err(e) => report(out_err, &e.into()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_delete_block(
    txn: *mut FdbTxn,
    block_id: u64,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if txn.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    match (*txn).txn.delete(block_id as BlockId) {
        Ok(()) => FDB_OK,
        Err(e) => report(out_err, &e.into()),
    }
}

// ── Query & introspection ───────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_read_blocks(
    db: *mut FdbDb,
    block_type: u16,
    out_data: *mut LgBlob,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    write_blob(out_data, LgBlob::empty());
    if db.is_null() || out_data.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    let Ok(block_type) = BlockType::try_from(block_type) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };

    match (*db).db.read_blocks_json(block_type) {
        Ok(json) => {
            write_blob(out_data, blob_from_string(json));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_render_block(
    db: *mut FdbDb,
    block_id: u64,
    opts: LgRenderOpts,
    out_text: *mut LgBlob,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    write_blob(out_text, LgBlob::empty());
    if db.is_null() || out_text.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    match (*db).db.render_block(block_id as BlockId, &render_opts(&opts)) {
        Ok(text) => {
            write_blob(out_text, blob_from_string(text));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_render_journal(
    db: *mut FdbDb,
    since: u64,
    opts: LgRenderOpts,
    out_text: *mut LgBlob,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    write_blob(out_text, LgBlob::empty());
    if db.is_null() || out_text.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    match (*db).db.render_journal(since, &render_opts(&opts)) {
        Ok(text) => {
            write_blob(out_text, blob_from_string(text));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_introspect_schema(
    db: *mut FdbDb,
    out_schema: *mut LgBlob,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    write_blob(out_schema, LgBlob::empty());
    if db.is_null() || out_schema.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    match (*db).db.introspect_schema() {
        Ok(schema) => {
            write_blob(out_schema, blob_from_string(schema));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_introspect_constraints(
    db: *mut FdbDb,
    out_constraints: *mut LgBlob,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    write_blob(out_constraints, LgBlob::empty());
    if db.is_null() || out_constraints.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    match (*db).db.introspect_constraints() {
        Ok(constraints) => {
            write_blob(out_constraints, blob_from_string(constraints));
            FDB_OK
        }
        Err(e) => report(out_err, &e),
    }
}

// ── Proof verification ──────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_proof_register_verifier(
    type_ptr: *const u8,
    type_len: usize,
    callback: Option<LgProofVerifier>,
    context: *mut c_void,
) -> c_int {
    let Some(name_bytes) = input_slice(type_ptr, type_len) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    let Ok(name) = std::str::from_utf8(name_bytes) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    let Some(callback) = callback else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    if name.is_empty() {
        return FDB_ERR_INVALID_ARGUMENT;
    }

    GLOBAL_REGISTRY.register(name, Box::new(ForeignVerifier { callback, context }));
    FDB_OK
}

#[no_mangle]
pub unsafe extern "C" fn fdb_proof_unregister_verifier(
    type_ptr: *const u8,
    type_len: usize,
) -> c_int {
    let Some(name_bytes) = input_slice(type_ptr, type_len) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };
    let Ok(name) = std::str::from_utf8(name_bytes) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };

    match GLOBAL_REGISTRY.unregister(name) {
        Ok(()) => FDB_OK,
        Err(e) => DbError::from(e).status() as c_int,
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_proof_verify(
    proof_ptr: *const u8,
    proof_len: usize,
    out_valid: *mut bool,
    out_err: *mut LgBlob,
) -> c_int {
    write_blob(out_err, LgBlob::empty());
    if out_valid.is_null() {
        return FDB_ERR_INVALID_ARGUMENT;
    }
    *out_valid = false;

    let Some(proof) = input_slice(proof_ptr, proof_len) else {
        return FDB_ERR_INVALID_ARGUMENT;
    };

    match GLOBAL_REGISTRY.verify(proof) {
        Ok(valid) => {
            *out_valid = valid;
            FDB_OK
        }
        Err(e) => report(out_err, &e.into()),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdb_proof_init_builtins() -> c_int {
    GLOBAL_REGISTRY.init_builtins();
    FDB_OK
}

// ── Utilities ───────────────────────────────────────────────────────

#[no_mangle]
pub unsafe extern "C" fn fdb_blob_free(blob: *mut LgBlob) {
    if blob.is_null() {
        return;
    }
    let b = &mut *blob;
    if b.ptr.is_null() || b.len == 0 {
        // Null/empty blob: guaranteed no-op
        return;
    }
    let slice = std::ptr::slice_from_raw_parts_mut(b.ptr as *mut u8, b.len);
    drop(Box::from_raw(slice));
    b.ptr = std::ptr::null();
    b.len = 0;
}

#[no_mangle]
pub extern "C" fn fdb_version() -> u32 {
    crate::version()
}
