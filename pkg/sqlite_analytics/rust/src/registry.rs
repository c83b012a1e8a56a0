// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Registry of the genuine SQLite entry points.
//!
//! Populated once at initialization and read-only afterwards. Each entry is an
//! `Option` so every caller has to decide what happens when the real function
//! could not be found, instead of jumping through a null pointer.
//!
//! Lookup order:
//! 1. `dlsym(RTLD_NEXT, ..)`, i.e. the next definition after this library in
//!    the global search order. When the host links libsqlite3 directly this is
//!    the copy its statement handles belong to, and it is used if all three
//!    intercepted functions are found there.
//! 2. Otherwise each configured library name is opened with `dlopen` and the
//!    symbols are looked up in that handle. `dlopen` by soname returns a copy
//!    that is already loaded under that soname, so `libsqlite3.so.0` comes
//!    first by default. A name that matches nothing loaded pulls in a second,
//!    independent engine; handles from the host's copy must never reach it.
//! 3. If no library can be opened, whatever step 1 found is used.
//!
//! An address equal to one of our own replacements is always rejected.

use std::ffi::{CStr, c_void};
use std::fmt;

use libloading::Library;
use log::{debug, error, warn};

use crate::errors::Error;
use crate::ffi::{FinalizeFn, PrepareV2Fn, SqlFn, StepFn};

const NEXT_IN_LOAD_ORDER: &str = "RTLD_NEXT";

/// The SQLite functions the interposer needs from the real library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    PrepareV2,
    Step,
    Finalize,
    /// Not intercepted; used to read a statement's text.
    Sql,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::PrepareV2, Target::Step, Target::Finalize, Target::Sql];

    pub fn symbol(self) -> &'static CStr {
        match self {
            Target::PrepareV2 => c"sqlite3_prepare_v2",
            Target::Step => c"sqlite3_step",
            Target::Finalize => c"sqlite3_finalize",
            Target::Sql => c"sqlite3_sql",
        }
    }

    /// Address of the replacement this library exports for `self`, if any.
    fn replacement_address(self) -> Option<usize> {
        match self {
            Target::PrepareV2 => Some(crate::ffi::sqlite3_prepare_v2 as *const () as usize),
            Target::Step => Some(crate::ffi::sqlite3_step as *const () as usize),
            Target::Finalize => Some(crate::ffi::sqlite3_finalize as *const () as usize),
            Target::Sql => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol().to_string_lossy())
    }
}

/// Convert a resolved address into a typed function pointer.
macro_rules! typed {
    ($addr:expr, $ty:ty) => {
        $addr.map(|addr| {
            // SAFETY: the address was returned by dlsym for the symbol whose C
            // signature `$ty` mirrors, and is non-zero.
            unsafe { std::mem::transmute::<usize, $ty>(addr) }
        })
    };
}

pub struct RealSqlite {
    prepare_v2: Option<PrepareV2Fn>,
    step: Option<StepFn>,
    finalize: Option<FinalizeFn>,
    sql: Option<SqlFn>,
    origin: String,
    // Keeps the pointers above valid. Never closed.
    _library: Option<Library>,
}

impl RealSqlite {
    /// Build a registry from already-known functions.
    pub fn new(
        prepare_v2: Option<PrepareV2Fn>,
        step: Option<StepFn>,
        finalize: Option<FinalizeFn>,
        sql: Option<SqlFn>,
    ) -> Self {
        Self {
            prepare_v2,
            step,
            finalize,
            sql,
            origin: "<provided>".to_string(),
            _library: None,
        }
    }

    /// Resolve every target, preferring the next definition in load order and
    /// falling back to the first library in `libraries` that can be opened.
    /// Missing symbols are reported individually and never stop the others.
    pub fn resolve(libraries: &[String]) -> Self {
        let real = Self::resolve_from(next_in_load_order, libraries);
        real.report();
        real
    }

    fn resolve_from(next: impl Fn(&CStr) -> *mut c_void, libraries: &[String]) -> Self {
        let from_next = Self::resolve_with(NEXT_IN_LOAD_ORDER.to_string(), next);
        if from_next.intercepts_all() {
            return from_next;
        }

        for name in libraries {
            match open(name) {
                Ok(library) => return Self::from_library(name, library),
                Err(e) => debug!("{e}"),
            }
        }

        warn!("could not load any of {libraries:?}, using the next definition in load order");
        from_next
    }

    fn from_library(name: &str, library: Library) -> Self {
        let mut real = Self::resolve_with(name.to_string(), |symbol| {
            // SAFETY: the symbol is only read as an address here; it is given
            // its real type in `resolve_with`.
            match unsafe { library.get::<*mut c_void>(symbol.to_bytes_with_nul()) } {
                Ok(sym) => *sym,
                Err(e) => {
                    debug!("{e}");
                    std::ptr::null_mut()
                }
            }
        });
        real._library = Some(library);
        real
    }

    /// Resolve every target through `lookup`, which returns the raw address
    /// of a symbol or null.
    fn resolve_with(origin: String, lookup: impl Fn(&CStr) -> *mut c_void) -> Self {
        let address = |target: Target| checked_address(target, lookup(target.symbol()));
        Self {
            prepare_v2: typed!(address(Target::PrepareV2), PrepareV2Fn),
            step: typed!(address(Target::Step), StepFn),
            finalize: typed!(address(Target::Finalize), FinalizeFn),
            sql: typed!(address(Target::Sql), SqlFn),
            origin,
            _library: None,
        }
    }

    pub fn prepare_v2(&self) -> Option<PrepareV2Fn> {
        self.prepare_v2
    }

    pub fn step(&self) -> Option<StepFn> {
        self.step
    }

    pub fn finalize(&self) -> Option<FinalizeFn> {
        self.finalize
    }

    pub fn sql(&self) -> Option<SqlFn> {
        self.sql
    }

    /// Where the functions were resolved from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_resolved(&self, target: Target) -> bool {
        match target {
            Target::PrepareV2 => self.prepare_v2.is_some(),
            Target::Step => self.step.is_some(),
            Target::Finalize => self.finalize.is_some(),
            Target::Sql => self.sql.is_some(),
        }
    }

    fn intercepts_all(&self) -> bool {
        self.prepare_v2.is_some() && self.step.is_some() && self.finalize.is_some()
    }

    pub fn missing(&self) -> Vec<Target> {
        Target::ALL
            .into_iter()
            .filter(|t| !self.is_resolved(*t))
            .collect()
    }

    fn report(&self) {
        for target in self.missing() {
            match target {
                Target::Sql => warn!(
                    "could not resolve {target} from {}: step and finalize calls will not be logged",
                    self.origin
                ),
                _ => error!(
                    "could not resolve {target} from {}: calls to it will fail with SQLITE_MISUSE",
                    self.origin
                ),
            }
        }
        if self.missing().is_empty() {
            debug!("resolved SQLite entry points from {}", self.origin);
        }
    }
}

impl fmt::Debug for RealSqlite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealSqlite")
            .field("origin", &self.origin)
            .field("missing", &self.missing())
            .finish()
    }
}

fn next_in_load_order(symbol: &CStr) -> *mut c_void {
    // SAFETY: `symbol` is a valid NUL-terminated string and RTLD_NEXT is a
    // valid pseudo-handle for dlsym.
    unsafe { libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) }
}

fn open(name: &str) -> Result<Library, Error> {
    // SAFETY: loading libsqlite3 runs no initialization code that could call
    // back into this library.
    unsafe { Library::new(name) }.map_err(|source| Error::LibraryLoad {
        library: name.to_string(),
        source,
    })
}

/// Null and self-referencing addresses count as unresolved.
fn checked_address(target: Target, addr: *mut c_void) -> Option<usize> {
    if addr.is_null() {
        return None;
    }
    let addr = addr as usize;
    if target.replacement_address() == Some(addr) {
        error!("{target} resolved to this library's own replacement; ignoring it");
        return None;
    }
    Some(addr)
}
