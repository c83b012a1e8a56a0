// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not open log store at {path}: {source}")]
    StoreOpen {
        path: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("could not create log schema: {0}")]
    Schema(#[source] duckdb::Error),

    #[error("could not append log entry: {0}")]
    Append(#[source] duckdb::Error),

    #[error("could not read log entries: {0}")]
    Read(#[source] duckdb::Error),

    #[error("could not load {library}: {source}")]
    LibraryLoad {
        library: String,
        #[source]
        source: libloading::Error,
    },

    #[error("unknown lifecycle status: {0}")]
    UnknownStatus(String),
}
