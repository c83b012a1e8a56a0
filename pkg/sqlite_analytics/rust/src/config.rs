// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/datadog-agent/sqlite_analytics.yaml";
pub const DEFAULT_DB_PATH: &str = "/tmp/sqlite_analytics.duckdb";

const ENV_CONFIG_PATH: &str = "DD_SQLITE_ANALYTICS_CONFIG";
const ENV_DB_PATH: &str = "DD_SQLITE_ANALYTICS_DB_PATH";
const ENV_LIBRARY: &str = "DD_SQLITE_ANALYTICS_LIBRARY";
const ENV_ENABLED: &str = "DD_SQLITE_ANALYTICS_ENABLED";

/// On-disk form of the configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub libraries: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub log_level: Option<String>,
}

/// Effective configuration after layering env > YAML > defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// DuckDB store path, or `:memory:`.
    pub db_path: String,
    /// Library names tried in order when looking for the real SQLite.
    pub libraries: Vec<String>,
    /// When false, calls are forwarded without being recorded.
    pub enabled: bool,
    pub log_level: log::Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            libraries: default_libraries(),
            enabled: true,
            log_level: log::Level::Info,
        }
    }
}

impl Config {
    /// Build the effective configuration from an optional parsed file and the
    /// current environment.
    pub fn resolve(file: Option<&FileConfig>) -> Self {
        let defaults = Config::default();

        let db_path = env::var(ENV_DB_PATH)
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| file.and_then(|f| f.db_path.clone()))
            .unwrap_or(defaults.db_path);

        let libraries = env::var(ENV_LIBRARY)
            .ok()
            .map(|v| split_library_list(&v))
            .filter(|l| !l.is_empty())
            .or_else(|| file.and_then(|f| f.libraries.clone()))
            .filter(|l| !l.is_empty())
            .unwrap_or(defaults.libraries);

        let enabled = get_env_bool_option(ENV_ENABLED)
            .or_else(|| file.and_then(|f| f.enabled))
            .unwrap_or(defaults.enabled);

        let log_level = env::var("DD_LOG_LEVEL")
            .or_else(|_| env::var("LOG_LEVEL"))
            .ok()
            .or_else(|| file.and_then(|f| f.log_level.clone()))
            .map(|level| parse_log_level(&level))
            .unwrap_or(defaults.log_level);

        Self {
            db_path,
            libraries,
            enabled,
            log_level,
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the YAML config file if it exists. A missing file is `Ok(None)`.
pub fn load_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Some(FileConfig::default()));
    }
    let config: FileConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(target_os = "macos")]
fn default_libraries() -> Vec<String> {
    vec!["libsqlite3.dylib".to_string()]
}

// The soname first: dlopen hands back a copy already loaded under it. The
// bare libsqlite3.so is usually only shipped by the -dev package.
#[cfg(not(target_os = "macos"))]
fn default_libraries() -> Vec<String> {
    vec!["libsqlite3.so.0".to_string(), "libsqlite3.so".to_string()]
}

fn split_library_list(value: &str) -> Vec<String> {
    value
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_env_bool_option(env_var: &str) -> Option<bool> {
    match env::var(env_var) {
        Ok(val) => {
            let normalized = val.to_lowercase();
            if normalized == "true" || normalized == "1" {
                Some(true)
            } else if normalized == "false" || normalized == "0" {
                Some(false)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Parse a Go log level string into a log::Level
/// Unknown levels silently default to Info
fn parse_log_level(level: &str) -> log::Level {
    match level.to_lowercase().as_str() {
        "trace" => log::Level::Trace,
        "debug" => log::Level::Debug,
        "info" => log::Level::Info,
        "warn" | "warning" => log::Level::Warn,
        "error" | "critical" => log::Level::Error,
        "off" => log::Level::Error,
        _ => log::Level::Info,
    }
}
