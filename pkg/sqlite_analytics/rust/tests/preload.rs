// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Runs a real SQLite client with the built library in `LD_PRELOAD` and reads
//! back what it logged.

#![cfg(target_os = "linux")]

use sqlite_analytics::{LogSink, Status, StoredEntry};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const THREADS: usize = 4;

// CPython's sqlite3 module calls sqlite3_prepare_v2 / sqlite3_step /
// sqlite3_finalize in the system libsqlite3. Statements are finalized when
// the connection's statement cache is collected, hence the gc.collect().
const CLIENT: &str = r#"
import gc, sqlite3, threading

con = sqlite3.connect(":memory:")
assert con.execute("SELECT 1 WHERE 0").fetchall() == []
assert con.execute("SELECT column1 FROM (VALUES (1), (2))").fetchall() == [(1,), (2,)]
try:
    con.execute("SELEC 1")
except sqlite3.OperationalError:
    pass
con.close()
del con

def worker(n):
    c = sqlite3.connect(":memory:")
    rows = c.execute("SELECT column1 FROM (VALUES (1), (2)) WHERE %d >= 0" % n).fetchall()
    assert rows == [(1,), (2,)]
    c.close()

threads = [threading.Thread(target=worker, args=(n,)) for n in range(THREADS)]
for t in threads:
    t.start()
for t in threads:
    t.join()
gc.collect()
"#;

/// The cdylib cargo builds next to this test binary.
fn interposer() -> PathBuf {
    let exe = std::env::current_exe().expect("test binary path");
    let deps = exe.parent().expect("deps directory");
    let profile = deps.parent().expect("profile directory");
    [profile, deps]
        .iter()
        .map(|dir| dir.join("libsqlite_analytics.so"))
        .find(|path| path.exists())
        .expect("libsqlite_analytics.so should be built alongside the tests")
}

fn python_with_sqlite() -> bool {
    Command::new("python3")
        .args(["-c", "import sqlite3"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn run_client(store: &Path, config_dir: &Path) -> Output {
    Command::new("python3")
        .args(["-c", &CLIENT.replace("THREADS", &THREADS.to_string())])
        .env("LD_PRELOAD", interposer())
        .env("DD_SQLITE_ANALYTICS_DB_PATH", store)
        .env("DD_SQLITE_ANALYTICS_CONFIG", config_dir.join("absent.yaml"))
        .env("DD_LOG_LEVEL", "debug")
        .env_remove("DD_SQLITE_ANALYTICS_LIBRARY")
        .env_remove("DD_SQLITE_ANALYTICS_ENABLED")
        .env_remove("LOG_LEVEL")
        .output()
        .expect("failed to start python3")
}

fn statuses_for(entries: &[StoredEntry], query: &str) -> Vec<Status> {
    entries
        .iter()
        .filter(|e| e.query == query)
        .map(|e| e.status)
        .collect()
}

#[test]
fn test_preloaded_client_is_logged() {
    if !python_with_sqlite() {
        eprintln!("skipping: python3 with the sqlite3 module is not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("queries.duckdb");

    let out = run_client(&store, dir.path());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "client failed:\n{stderr}");
    assert!(
        !stderr.contains("could not open log store"),
        "store should open in the preloaded process:\n{stderr}"
    );
    assert!(store.exists(), "no store was written:\n{stderr}");

    let entries = LogSink::initialize(store.to_str().unwrap())
        .unwrap()
        .entries()
        .unwrap();

    assert_eq!(
        statuses_for(&entries, "SELECT 1 WHERE 0"),
        vec![Status::Prepared, Status::Completed, Status::Finalized],
        "zero-row statement:\n{entries:#?}"
    );
    assert_eq!(
        statuses_for(&entries, "SELECT column1 FROM (VALUES (1), (2))"),
        vec![
            Status::Prepared,
            Status::Executing,
            Status::Executing,
            Status::Completed,
            Status::Finalized,
        ]
    );
    assert_eq!(statuses_for(&entries, "SELEC 1"), vec![Status::Prepared]);

    let mut worker_tids = Vec::new();
    for n in 0..THREADS {
        let query = format!("SELECT column1 FROM (VALUES (1), (2)) WHERE {n} >= 0");
        let mine: Vec<&StoredEntry> = entries.iter().filter(|e| e.query == query).collect();
        let statuses: Vec<Status> = mine.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                Status::Prepared,
                Status::Executing,
                Status::Executing,
                Status::Completed,
                Status::Finalized,
            ],
            "worker {n}"
        );

        // Finalize may run on whichever thread collects the cache.
        let tid = mine[0].thread_id;
        assert!(
            mine.iter()
                .filter(|e| e.status != Status::Finalized)
                .all(|e| e.thread_id == tid)
        );
        worker_tids.push(tid);
    }
    worker_tids.sort_unstable();
    worker_tids.dedup();
    assert_eq!(worker_tids.len(), THREADS, "each worker has its own thread id");

    let mut ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), entries.len(), "ids must be unique");
    for e in &entries {
        assert!(!e.hostname.is_empty());
        assert!(!e.ip.is_empty());
        assert!(!e.timestamp.is_empty());
    }
}

#[test]
fn test_unwritable_store_does_not_change_results() {
    if !python_with_sqlite() {
        eprintln!("skipping: python3 with the sqlite3 module is not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("missing").join("queries.duckdb");

    let out = run_client(&store, dir.path());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "client failed:\n{stderr}");
    assert!(stderr.contains("could not open log store"), "{stderr}");
    assert!(!store.exists());
}
