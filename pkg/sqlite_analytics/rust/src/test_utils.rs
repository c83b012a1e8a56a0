// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Test helpers: an in-process stand-in for SQLite and a log capture.
//!
//! The fake engine hands out heap statements that yield a per-thread number
//! of rows. Finalized statements are never freed, their text is cleared so a
//! read after finalize shows up as a missing query rather than a crash.

#![allow(clippy::unwrap_used)]

use std::cell::Cell;
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};

use crate::ffi::{
    SQLITE_DONE, SQLITE_ERROR, SQLITE_MISUSE, SQLITE_OK, SQLITE_ROW, sqlite3, sqlite3_stmt,
};
use crate::registry::RealSqlite;

thread_local! {
    static ROWS: Cell<usize> = const { Cell::new(0) };
}

/// Number of rows statements prepared on this thread will yield.
pub fn set_rows(rows: usize) {
    ROWS.with(|r| r.set(rows));
}

struct FakeStmt {
    sql: CString,
    rows_left: usize,
    finalized: bool,
}

/// Fails with `SQLITE_ERROR` when the text contains "syntax error".
pub unsafe extern "C" fn fake_prepare_v2(
    _db: *mut sqlite3,
    z_sql: *const c_char,
    _n_byte: c_int,
    pp_stmt: *mut *mut sqlite3_stmt,
    pz_tail: *mut *const c_char,
) -> c_int {
    if z_sql.is_null() || pp_stmt.is_null() {
        return SQLITE_MISUSE;
    }
    // SAFETY: tests always pass NUL-terminated text.
    let sql = unsafe { CStr::from_ptr(z_sql) };
    if sql.to_string_lossy().contains("syntax error") {
        // SAFETY: checked non-null above.
        unsafe { *pp_stmt = ptr::null_mut() };
        return SQLITE_ERROR;
    }

    let stmt = Box::new(FakeStmt {
        sql: sql.to_owned(),
        rows_left: ROWS.with(Cell::get),
        finalized: false,
    });
    // SAFETY: checked non-null above; the tail points at the terminator.
    unsafe {
        *pp_stmt = Box::into_raw(stmt).cast();
        if !pz_tail.is_null() {
            *pz_tail = z_sql.add(sql.to_bytes().len());
        }
    }
    SQLITE_OK
}

pub unsafe extern "C" fn fake_step(stmt: *mut sqlite3_stmt) -> c_int {
    if stmt.is_null() {
        return SQLITE_MISUSE;
    }
    // SAFETY: every non-null statement in tests comes from fake_prepare_v2.
    let stmt = unsafe { &mut *stmt.cast::<FakeStmt>() };
    if stmt.finalized {
        return SQLITE_MISUSE;
    }
    if stmt.rows_left > 0 {
        stmt.rows_left -= 1;
        SQLITE_ROW
    } else {
        SQLITE_DONE
    }
}

pub unsafe extern "C" fn fake_finalize(stmt: *mut sqlite3_stmt) -> c_int {
    if stmt.is_null() {
        return SQLITE_OK;
    }
    // SAFETY: as in fake_step.
    let stmt = unsafe { &mut *stmt.cast::<FakeStmt>() };
    stmt.finalized = true;
    stmt.sql = CString::default();
    SQLITE_OK
}

pub unsafe extern "C" fn fake_sql(stmt: *mut sqlite3_stmt) -> *const c_char {
    if stmt.is_null() {
        return ptr::null();
    }
    // SAFETY: as in fake_step.
    let stmt = unsafe { &*stmt.cast::<FakeStmt>() };
    if stmt.finalized {
        ptr::null()
    } else {
        stmt.sql.as_ptr()
    }
}

pub fn fake_engine() -> RealSqlite {
    RealSqlite::new(
        Some(fake_prepare_v2),
        Some(fake_step),
        Some(fake_finalize),
        Some(fake_sql),
    )
}

type Captured = (ThreadId, log::Level, String);

static CAPTURED: Mutex<Vec<Captured>> = Mutex::new(Vec::new());

struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        let entry = (thread::current().id(), record.level(), record.args().to_string());
        CAPTURED
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(entry);
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Install the capturing logger for the whole test binary. Safe to call from
/// every test that wants to inspect diagnostics.
pub fn capture_logs() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
}

/// Diagnostics emitted so far by the calling thread.
pub fn logs_for_current_thread() -> Vec<(log::Level, String)> {
    let me = thread::current().id();
    CAPTURED
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .iter()
        .filter(|(tid, _, _)| *tid == me)
        .map(|(_, level, msg)| (*level, msg.clone()))
        .collect()
}
