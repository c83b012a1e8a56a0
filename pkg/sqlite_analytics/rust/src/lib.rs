// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Preloadable interposer for SQLite's statement API.
//!
//! Loaded with `LD_PRELOAD` (or `DYLD_INSERT_LIBRARIES`), the library exports
//! `sqlite3_prepare_v2`, `sqlite3_step` and `sqlite3_finalize`. Each
//! replacement records one lifecycle event into a DuckDB store and forwards
//! to the genuine implementation resolved from `libsqlite3`, returning its
//! result untouched. A failure anywhere in the recording path is reported on
//! stderr and never changes what the application observes.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod caller_info;
pub mod config;
pub mod context;
pub mod entry;
mod errors;
pub mod ffi;
mod hooks;
pub mod registry;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the public API
pub use caller_info::CallerInfo;
pub use config::Config;
pub use context::{Context, ensure_initialized};
pub use entry::{LogEntry, Status, StoredEntry};
pub use errors::Error;
pub use registry::RealSqlite;
pub use sink::LogSink;

/// Load-time constructor (Linux). Loads configuration only; the real SQLite
/// and the log store are opened by the first intercepted call.
#[cfg(all(feature = "attach-init", target_os = "linux", not(test)))]
#[unsafe(link_section = ".init_array")]
#[used]
static ATTACH: extern "C" fn() = {
    extern "C" fn attach() {
        let _ = std::panic::catch_unwind(context::ensure_initialized);
    }
    attach
};

/// Load-time constructor (macOS). dyld runs it after libSystem is up.
#[cfg(all(feature = "attach-init", target_os = "macos", not(test)))]
#[unsafe(link_section = "__DATA,__mod_init_func")]
#[used]
static ATTACH: extern "C" fn() = {
    extern "C" fn attach() {
        let _ = std::panic::catch_unwind(context::ensure_initialized);
    }
    attach
};
