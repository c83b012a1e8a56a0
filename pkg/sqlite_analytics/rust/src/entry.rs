// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

/// Lifecycle phase that emitted a log entry. This is not a success/failure
/// code: a failing `sqlite3_step` is still recorded as `Executing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `sqlite3_prepare_v2` was called with the statement text.
    Prepared,
    /// `sqlite3_step` returned anything other than `SQLITE_DONE`.
    Executing,
    /// `sqlite3_step` returned `SQLITE_DONE`.
    Completed,
    /// `sqlite3_finalize` is about to release the statement.
    Finalized,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Prepared => "prepared",
            Status::Executing => "executing",
            Status::Completed => "completed",
            Status::Finalized => "finalized",
        }
    }

    /// Whether `next` may follow `self` for the same statement handle.
    ///
    /// Stepping a completed statement again resets it implicitly, so
    /// `Completed -> Executing` and `Completed -> Completed` are allowed.
    /// Nothing follows `Finalized`.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Prepared, Executing)
                | (Prepared, Completed)
                | (Executing, Executing)
                | (Executing, Completed)
                | (Completed, Executing)
                | (Completed, Completed)
                | (Prepared, Finalized)
                | (Executing, Finalized)
                | (Completed, Finalized)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepared" => Ok(Status::Prepared),
            "executing" => Ok(Status::Executing),
            "completed" => Ok(Status::Completed),
            "finalized" => Ok(Status::Finalized),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// One event handed to the sink. Everything is borrowed for the duration of
/// the append; `id` and `timestamp` are assigned by the sink.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    pub query: &'a str,
    pub hostname: &'a str,
    pub ip: &'a str,
    pub thread_id: i64,
    pub status: Status,
}

/// A row read back from `sqlite_queries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub id: i64,
    pub query: String,
    pub timestamp: String,
    pub hostname: String,
    pub ip: String,
    pub thread_id: i64,
    pub status: Status,
}

/// OS-level id of the calling thread.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> i64 {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    i64::from(tid)
}

/// OS-level id of the calling thread.
#[cfg(target_os = "macos")]
pub fn current_thread_id() -> i64 {
    let mut tid: u64 = 0;
    // SAFETY: a null pthread_t selects the calling thread and `tid` is a
    // valid out-pointer.
    unsafe {
        libc::pthread_threadid_np(std::ptr::null_mut(), &mut tid);
    }
    i64::try_from(tid).unwrap_or(i64::MAX)
}
