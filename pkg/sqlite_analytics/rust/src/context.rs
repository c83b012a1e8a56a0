// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Process-wide interposer state.
//!
//! Everything the replacements need lives in a single [`Context`] that is
//! built exactly once, either by the load-time constructor or by the first
//! intercepted call, whichever comes first. Building it only loads the
//! configuration and installs diagnostics. The real SQLite and the log store
//! are opened on the first intercepted call: a constructor runs before the
//! bundled DuckDB's own static initializers, and before the host has
//! `dlopen`ed its SQLite.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use crate::caller_info::CallerInfo;
use crate::config::{self, Config};
use crate::entry::{LogEntry, Status, current_thread_id};
use crate::registry::RealSqlite;
use crate::sink::LogSink;

static CONTEXT: OnceLock<Context> = OnceLock::new();
static INIT_FAILED: AtomicBool = AtomicBool::new(false);
static PASSTHROUGH: OnceLock<RealSqlite> = OnceLock::new();

thread_local! {
    // Set while this thread builds the context, so SQLite calls made from
    // inside initialization do not wait on themselves.
    static INITIALIZING: Cell<bool> = const { Cell::new(false) };
    // Set while this thread is opening or writing to the log store.
    static IN_RECORD: Cell<bool> = const { Cell::new(false) };
}

/// Per-thread flag guard: `enter` fails if the flag is already set, and the
/// flag is cleared on drop.
struct ThreadFlag(&'static std::thread::LocalKey<Cell<bool>>);

impl ThreadFlag {
    fn enter(key: &'static std::thread::LocalKey<Cell<bool>>) -> Option<Self> {
        key.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ThreadFlag(key))
            }
        })
    }
}

impl Drop for ThreadFlag {
    fn drop(&mut self) {
        self.0.with(|flag| flag.set(false));
    }
}

/// What every entry needs besides the query: where it is written and who
/// issued it.
struct Recorder {
    caller: CallerInfo,
    sink: LogSink,
}

pub struct Context {
    config: Config,
    real: OnceLock<RealSqlite>,
    recorder: OnceLock<Option<Recorder>>,
}

impl Context {
    /// Context whose real SQLite is resolved from the configured libraries on
    /// first use.
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            real: OnceLock::new(),
            recorder: OnceLock::new(),
        }
    }

    /// Context around an already-resolved registry.
    pub fn with_registry(config: Config, real: RealSqlite) -> Self {
        Self {
            config,
            real: OnceLock::from(real),
            recorder: OnceLock::new(),
        }
    }

    /// The process-wide context, initializing it on first use.
    ///
    /// Returns `None` for SQLite calls made by the initializing thread while
    /// initialization is still running, and for every call once
    /// initialization has panicked. Callers then forward through
    /// [`Context::passthrough`].
    pub fn current() -> Option<&'static Context> {
        Self::current_with(ensure_initialized, &INIT_FAILED)
    }

    fn current_with(init: fn() -> &'static Context, failed: &AtomicBool) -> Option<&'static Context> {
        if INITIALIZING.with(Cell::get) {
            return CONTEXT.get();
        }
        if failed.load(Ordering::Acquire) {
            return None;
        }
        match panic::catch_unwind(init) {
            Ok(ctx) => Some(ctx),
            Err(_) => {
                failed.store(true, Ordering::Release);
                error!("initialization panicked, forwarding SQLite calls without logging");
                None
            }
        }
    }

    /// Registry used when no context is available. Built from the default
    /// library list, independently of any configuration.
    pub fn passthrough() -> &'static RealSqlite {
        PASSTHROUGH.get_or_init(|| RealSqlite::resolve(&Config::default().libraries))
    }

    pub fn real(&self) -> &RealSqlite {
        self.real
            .get_or_init(|| RealSqlite::resolve(&self.config.libraries))
    }

    pub fn caller(&self) -> Option<&CallerInfo> {
        self.recorder().map(|r| &r.caller)
    }

    pub fn sink(&self) -> Option<&LogSink> {
        self.recorder().map(|r| &r.sink)
    }

    /// Whether intercepted calls are written to the store. The first call
    /// opens the store.
    pub fn is_recording(&self) -> bool {
        self.recorder().is_some()
    }

    fn recorder(&self) -> Option<&Recorder> {
        if let Some(recorder) = self.recorder.get() {
            return recorder.as_ref();
        }
        // SQLite calls made while this thread opens the store are forwarded
        // without being recorded.
        let _opening = ThreadFlag::enter(&IN_RECORD)?;
        self.recorder.get_or_init(|| self.open_recorder()).as_ref()
    }

    /// A store that cannot be opened is reported once and leaves the context
    /// forwarding calls without recording them.
    fn open_recorder(&self) -> Option<Recorder> {
        if !self.config.enabled {
            info!("query logging is disabled, forwarding SQLite calls only");
            return None;
        }

        let caller = CallerInfo::resolve();
        match LogSink::initialize(&self.config.db_path) {
            Ok(sink) => {
                info!(
                    "logging SQLite queries to {} (host {}, ip {})",
                    sink.path(),
                    caller.hostname,
                    caller.ip
                );
                Some(Recorder { caller, sink })
            }
            Err(e) => {
                error!("{e}; SQLite queries will not be logged");
                None
            }
        }
    }

    /// Record one lifecycle event. Never fails and never panics: store errors
    /// are reported by the sink, and SQLite calls made while this thread is
    /// already recording are not recorded again.
    pub(crate) fn record(&self, query: &str, status: Status) {
        let Some(recorder) = self.recorder() else {
            return;
        };
        let Some(_guard) = ThreadFlag::enter(&IN_RECORD) else {
            debug!("skipping nested {status} event");
            return;
        };

        let entry = LogEntry {
            query,
            hostname: &recorder.caller.hostname,
            ip: &recorder.caller.ip,
            thread_id: current_thread_id(),
            status,
        };
        if panic::catch_unwind(AssertUnwindSafe(|| recorder.sink.record(&entry))).is_err() {
            error!("panic while logging {status} query");
        }
    }
}

/// Build the process-wide context if it does not exist yet and return it.
///
/// Idempotent and safe to call from any number of threads; exactly one of
/// them runs the initialization.
pub fn ensure_initialized() -> &'static Context {
    CONTEXT.get_or_init(|| {
        let _initializing = ThreadFlag::enter(&INITIALIZING);
        initialize()
    })
}

fn initialize() -> Context {
    let path = config::config_path();
    let file = config::load_file(&path);
    let config = Config::resolve(file.as_ref().ok().and_then(Option::as_ref));

    install_logger(config.log_level);
    match &file {
        Ok(Some(_)) => debug!("loaded configuration from {}", path.display()),
        Ok(None) => debug!("no configuration file at {}, using environment", path.display()),
        Err(e) => warn!("ignoring configuration file: {e:#}"),
    }

    Context::from_config(config)
}

/// Route diagnostics to stderr. The library carries its own copy of `log`,
/// so these records never reach a logger installed by the host process.
fn install_logger(level: log::Level) {
    // Fails only if this library already installed one.
    let _ = simple_logger::SimpleLogger::new()
        .with_level(level.to_level_filter())
        .init();
}
