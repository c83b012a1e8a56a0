// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Append-only DuckDB store for statement lifecycle events.
//!
//! The sink owns the only connection to the store. DuckDB connections are not
//! shared between writers here: every append takes the connection mutex, runs
//! one insert in its own transaction and commits before releasing it, so ids
//! and timestamps follow commit order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use duckdb::{Config as DuckConfig, Connection, params};
use log::{debug, error};

use crate::entry::{LogEntry, StoredEntry};
use crate::errors::Error;

pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = "
    CREATE SEQUENCE IF NOT EXISTS sqlite_queries_id_seq START 1;
    CREATE TABLE IF NOT EXISTS sqlite_queries (
        id INTEGER PRIMARY KEY DEFAULT nextval('sqlite_queries_id_seq'),
        query TEXT,
        timestamp TIMESTAMP,
        hostname VARCHAR,
        ip VARCHAR,
        thread_id INTEGER,
        status VARCHAR
    );
";

// The id is drawn explicitly so stores created without the column default
// still get one.
const INSERT: &str = "
    INSERT INTO sqlite_queries (id, query, timestamp, hostname, ip, thread_id, status)
    VALUES (nextval('sqlite_queries_id_seq'), ?, CURRENT_TIMESTAMP, ?, ?, ?, ?)
    RETURNING id
";

const SELECT_ALL: &str = "
    SELECT id, query, CAST(timestamp AS VARCHAR), hostname, ip, thread_id, status
    FROM sqlite_queries
    ORDER BY id
";

pub struct LogSink {
    path: String,
    conn: Mutex<Connection>,
}

impl LogSink {
    /// Open (or create) the store at `path` and make sure the schema exists.
    ///
    /// Safe to call on a store that already has the schema. `:memory:`
    /// selects a private in-memory store.
    pub fn initialize(path: &str) -> Result<Self, Error> {
        let open_err = |source| Error::StoreOpen {
            path: path.to_string(),
            source,
        };

        // One worker thread: the sink only ever runs single-row inserts and
        // must not grow a thread pool inside the host process.
        let flags = DuckConfig::default().threads(1).map_err(open_err)?;
        let conn = if path == IN_MEMORY {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(path, flags)
        }
        .map_err(open_err)?;

        conn.execute_batch(SCHEMA).map_err(Error::Schema)?;
        debug!("log store ready at {path}");

        Ok(Self {
            path: path.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Insert one entry and return the id the store assigned to it.
    pub fn append(&self, entry: &LogEntry<'_>) -> Result<i64, Error> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(Error::Append)?;
        let id = tx
            .query_row(
                INSERT,
                params![
                    entry.query,
                    entry.hostname,
                    entry.ip,
                    entry.thread_id,
                    entry.status.as_str()
                ],
                |row| row.get::<_, i64>(0),
            )
            .map_err(Error::Append)?;
        tx.commit().map_err(Error::Append)?;
        Ok(id)
    }

    /// Best-effort append: a failure is reported and dropped so it can never
    /// reach the caller of the intercepted SQLite function.
    pub fn record(&self, entry: &LogEntry<'_>) {
        if let Err(e) = self.append(entry) {
            error!("failed to log {} query: {e}", entry.status);
        }
    }

    /// All stored entries in id order.
    pub fn entries(&self) -> Result<Vec<StoredEntry>, Error> {
        let conn = self.lock();
        let mut stmt = conn.prepare(SELECT_ALL).map_err(Error::Read)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(Error::Read)?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, query, timestamp, hostname, ip, thread_id, status) =
                row.map_err(Error::Read)?;
            entries.push(StoredEntry {
                id,
                query: query.unwrap_or_default(),
                timestamp: timestamp.unwrap_or_default(),
                hostname: hostname.unwrap_or_default(),
                ip: ip.unwrap_or_default(),
                thread_id: thread_id.unwrap_or_default(),
                status: status.parse()?,
            });
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<usize, Error> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM sqlite_queries", [], |row| row.get(0))
            .map_err(Error::Read)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // A writer that panicked mid-append leaves an uncommitted transaction
    // behind, which DuckDB rolls back; the connection itself is still usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
