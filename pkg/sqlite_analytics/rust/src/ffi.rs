// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! C ABI replacements for SQLite's statement API.
//!
//! Exports three symbols that shadow the real ones when this library is
//! preloaded:
//! - `sqlite3_prepare_v2`
//! - `sqlite3_step`
//! - `sqlite3_finalize`
//!
//! Signatures, argument types and return codes are exactly SQLite's. The
//! replacements only observe; results and out-parameters come straight from
//! the real implementation.
//!
//! On macOS, interposition of a two-level namespace library additionally
//! needs `DYLD_FORCE_FLAT_NAMESPACE=1`.

#![allow(non_camel_case_types)] // C ABI types use C naming conventions

use std::ffi::{c_char, c_int};

use crate::context::Context;
use crate::hooks;

// ---------------------------------------------------------------------------
// SQLite C API surface
// ---------------------------------------------------------------------------

/// Opaque database connection handle.
#[repr(C)]
pub struct sqlite3 {
    _private: [u8; 0],
}

/// Opaque prepared statement handle.
#[repr(C)]
pub struct sqlite3_stmt {
    _private: [u8; 0],
}

pub const SQLITE_OK: c_int = 0;
pub const SQLITE_ERROR: c_int = 1;
/// Returned by a replacement whose real implementation could not be resolved.
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_ROW: c_int = 100;
pub const SQLITE_DONE: c_int = 101;

pub type PrepareV2Fn = unsafe extern "C" fn(
    db: *mut sqlite3,
    z_sql: *const c_char,
    n_byte: c_int,
    pp_stmt: *mut *mut sqlite3_stmt,
    pz_tail: *mut *const c_char,
) -> c_int;

pub type StepFn = unsafe extern "C" fn(stmt: *mut sqlite3_stmt) -> c_int;

pub type FinalizeFn = unsafe extern "C" fn(stmt: *mut sqlite3_stmt) -> c_int;

pub type SqlFn = unsafe extern "C" fn(stmt: *mut sqlite3_stmt) -> *const c_char;

// ---------------------------------------------------------------------------
// Replacements
// ---------------------------------------------------------------------------

/// Replacement for `sqlite3_prepare_v2`. Logs the statement text as
/// `prepared`, then delegates.
///
/// # Safety
/// Same contract as SQLite's `sqlite3_prepare_v2`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sqlite3_prepare_v2(
    db: *mut sqlite3,
    z_sql: *const c_char,
    n_byte: c_int,
    pp_stmt: *mut *mut sqlite3_stmt,
    pz_tail: *mut *const c_char,
) -> c_int {
    let Some(ctx) = Context::current() else {
        // SAFETY: forwarded from the caller's contract.
        return unsafe {
            hooks::forward_prepare_v2(Context::passthrough(), db, z_sql, n_byte, pp_stmt, pz_tail)
        };
    };
    // SAFETY: arguments are forwarded untouched from the caller, who upholds
    // the sqlite3_prepare_v2 contract.
    unsafe { hooks::prepare_v2(ctx, db, z_sql, n_byte, pp_stmt, pz_tail) }
}

/// Replacement for `sqlite3_step`. Delegates, then logs `executing` or
/// `completed` depending on the result.
///
/// # Safety
/// Same contract as SQLite's `sqlite3_step`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sqlite3_step(stmt: *mut sqlite3_stmt) -> c_int {
    let Some(ctx) = Context::current() else {
        // SAFETY: `stmt` is forwarded untouched from the caller.
        return unsafe { hooks::forward_step(Context::passthrough(), stmt) };
    };
    // SAFETY: `stmt` is forwarded untouched from the caller.
    unsafe { hooks::step(ctx, stmt) }
}

/// Replacement for `sqlite3_finalize`. Logs `finalized` while the handle is
/// still valid, then delegates.
///
/// # Safety
/// Same contract as SQLite's `sqlite3_finalize`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sqlite3_finalize(stmt: *mut sqlite3_stmt) -> c_int {
    let Some(ctx) = Context::current() else {
        // SAFETY: `stmt` is forwarded untouched from the caller.
        return unsafe { hooks::forward_finalize(Context::passthrough(), stmt) };
    };
    // SAFETY: `stmt` is forwarded untouched from the caller.
    unsafe { hooks::finalize(ctx, stmt) }
}
