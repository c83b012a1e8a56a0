// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Interception logic behind the exported replacements.
//!
//! Each hook takes the context explicitly so it can run against a fake
//! engine in tests. Recording always goes through [`Context::record`], which
//! swallows every failure; the value returned to the application is always
//! the one produced by the real function.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};
use std::ptr;

use log::trace;

use crate::context::Context;
use crate::entry::Status;
use crate::ffi::{SQLITE_DONE, SQLITE_MISUSE, sqlite3, sqlite3_stmt};
use crate::registry::RealSqlite;

/// Result of a prepare call that cannot be forwarded.
///
/// # Safety
/// `pp_stmt` must be null or valid for writes.
pub(crate) unsafe fn unavailable_prepare(pp_stmt: *mut *mut sqlite3_stmt) -> c_int {
    if !pp_stmt.is_null() {
        // SAFETY: non-null and writable per the caller's contract.
        unsafe { *pp_stmt = ptr::null_mut() };
    }
    SQLITE_MISUSE
}

/// # Safety
/// Same contract as `sqlite3_prepare_v2`.
pub(crate) unsafe fn prepare_v2(
    ctx: &Context,
    db: *mut sqlite3,
    z_sql: *const c_char,
    n_byte: c_int,
    pp_stmt: *mut *mut sqlite3_stmt,
    pz_tail: *mut *const c_char,
) -> c_int {
    let Some(real) = ctx.real().prepare_v2() else {
        // SAFETY: forwarded from the caller's contract.
        return unsafe { unavailable_prepare(pp_stmt) };
    };

    if ctx.is_recording() {
        // SAFETY: `z_sql` satisfies the sqlite3_prepare_v2 contract.
        if let Some(sql) = unsafe { sql_text(z_sql, n_byte) } {
            ctx.record(&sql, Status::Prepared);
        }
    }

    // SAFETY: arguments forwarded untouched to the real implementation.
    unsafe { real(db, z_sql, n_byte, pp_stmt, pz_tail) }
}

/// # Safety
/// Same contract as `sqlite3_step`.
pub(crate) unsafe fn step(ctx: &Context, stmt: *mut sqlite3_stmt) -> c_int {
    let Some(real) = ctx.real().step() else {
        return SQLITE_MISUSE;
    };

    // SAFETY: forwarded untouched to the real implementation.
    let rc = unsafe { real(stmt) };

    if ctx.is_recording() {
        // SAFETY: the statement has not been finalized; step just used it.
        if let Some(sql) = unsafe { statement_sql(ctx, stmt) } {
            ctx.record(&sql, step_status(rc));
        }
    }
    rc
}

/// # Safety
/// Same contract as `sqlite3_finalize`.
pub(crate) unsafe fn finalize(ctx: &Context, stmt: *mut sqlite3_stmt) -> c_int {
    let Some(real) = ctx.real().finalize() else {
        return SQLITE_MISUSE;
    };

    // The text belongs to the statement and is gone once it is finalized.
    if ctx.is_recording() {
        // SAFETY: the statement is still live until `real` runs below.
        if let Some(sql) = unsafe { statement_sql(ctx, stmt) } {
            ctx.record(&sql, Status::Finalized);
        }
    }

    // SAFETY: forwarded untouched to the real implementation.
    unsafe { real(stmt) }
}

/// Forward `sqlite3_prepare_v2` without recording anything.
///
/// # Safety
/// Same contract as `sqlite3_prepare_v2`.
pub(crate) unsafe fn forward_prepare_v2(
    real: &RealSqlite,
    db: *mut sqlite3,
    z_sql: *const c_char,
    n_byte: c_int,
    pp_stmt: *mut *mut sqlite3_stmt,
    pz_tail: *mut *const c_char,
) -> c_int {
    match real.prepare_v2() {
        // SAFETY: arguments forwarded untouched to the real implementation.
        Some(prepare_v2) => unsafe { prepare_v2(db, z_sql, n_byte, pp_stmt, pz_tail) },
        // SAFETY: forwarded from the caller's contract.
        None => unsafe { unavailable_prepare(pp_stmt) },
    }
}

/// # Safety
/// Same contract as `sqlite3_step`.
pub(crate) unsafe fn forward_step(real: &RealSqlite, stmt: *mut sqlite3_stmt) -> c_int {
    match real.step() {
        // SAFETY: forwarded untouched to the real implementation.
        Some(step) => unsafe { step(stmt) },
        None => SQLITE_MISUSE,
    }
}

/// # Safety
/// Same contract as `sqlite3_finalize`.
pub(crate) unsafe fn forward_finalize(real: &RealSqlite, stmt: *mut sqlite3_stmt) -> c_int {
    match real.finalize() {
        // SAFETY: forwarded untouched to the real implementation.
        Some(finalize) => unsafe { finalize(stmt) },
        None => SQLITE_MISUSE,
    }
}

/// `completed` once the statement reports it has run to the end; every other
/// result, errors included, counts as still `executing`.
fn step_status(rc: c_int) -> Status {
    if rc == SQLITE_DONE {
        Status::Completed
    } else {
        Status::Executing
    }
}

/// Text handed to `sqlite3_prepare_v2`. A negative `n_byte` means the text
/// runs to the first NUL; otherwise at most `n_byte` bytes are read, stopping
/// early at a NUL.
///
/// # Safety
/// `z_sql` must be null, or readable up to the first NUL or `n_byte` bytes,
/// whichever comes first.
unsafe fn sql_text<'a>(z_sql: *const c_char, n_byte: c_int) -> Option<Cow<'a, str>> {
    if z_sql.is_null() {
        return None;
    }

    let bytes: &'a [u8] = match usize::try_from(n_byte) {
        // SAFETY: NUL-terminated per the caller's contract.
        Err(_) => unsafe { CStr::from_ptr(z_sql) }.to_bytes(),
        Ok(max) => {
            let mut len = 0;
            // SAFETY: never reads past `max` bytes or the first NUL.
            while len < max && unsafe { *z_sql.add(len) } != 0 {
                len += 1;
            }
            // SAFETY: the `len` bytes just scanned are readable.
            unsafe { std::slice::from_raw_parts(z_sql.cast::<u8>(), len) }
        }
    };
    Some(String::from_utf8_lossy(bytes))
}

/// Original text of a live statement, through the real `sqlite3_sql`.
///
/// # Safety
/// `stmt` must be null or a statement that has not been finalized.
unsafe fn statement_sql<'a>(ctx: &Context, stmt: *mut sqlite3_stmt) -> Option<Cow<'a, str>> {
    if stmt.is_null() {
        return None;
    }
    let sql = ctx.real().sql()?;
    // SAFETY: `stmt` is live per the caller's contract.
    let text = unsafe { sql(stmt) };
    if text.is_null() {
        trace!("statement has no SQL text, not logging it");
        return None;
    }
    // SAFETY: sqlite3_sql returns a NUL-terminated string owned by the
    // statement, valid until it is finalized.
    Some(unsafe { CStr::from_ptr(text) }.to_string_lossy())
}
