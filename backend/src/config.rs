//! Runtime settings read from the environment.
//!
//! | Variable                              | Default  |
//! |---------------------------------------|----------|
//! | `EXCEL_CLEANER_PORT`                  | 3000     |
//! | `EXCEL_CLEANER_MAX_UPLOAD_BYTES`      | 16 MiB   |
//! | `EXCEL_CLEANER_REQUEST_TIMEOUT_SECS`  | 60       |
//! | `EXCEL_CLEANER_PREVIEW_ROWS`          | 5        |
//!
//! A `.env` file in the working directory is loaded first, if present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

pub const PORT_VAR: &str = "EXCEL_CLEANER_PORT";
pub const MAX_UPLOAD_VAR: &str = "EXCEL_CLEANER_MAX_UPLOAD_BYTES";
pub const TIMEOUT_VAR: &str = "EXCEL_CLEANER_REQUEST_TIMEOUT_SECS";
pub const PREVIEW_ROWS_VAR: &str = "EXCEL_CLEANER_PREVIEW_ROWS";

/// Upload extensions the server accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
    pub preview_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_upload_bytes: 16 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            preview_rows: 5,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_var(TIMEOUT_VAR, read(TIMEOUT_VAR), defaults.request_timeout.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::invalid("environment", TIMEOUT_VAR, "must be at least 1"));
        }

        Ok(Self {
            port: parse_var(PORT_VAR, read(PORT_VAR), defaults.port)?,
            max_upload_bytes: parse_var(MAX_UPLOAD_VAR, read(MAX_UPLOAD_VAR), defaults.max_upload_bytes)?,
            request_timeout: Duration::from_secs(timeout_secs),
            preview_rows: parse_var(PREVIEW_ROWS_VAR, read(PREVIEW_ROWS_VAR), defaults.preview_rows)?,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// True when `file_name` ends in one of [`ALLOWED_EXTENSIONS`], case-insensitively.
pub fn is_allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>, default: T) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid("environment", key, format!("'{}': {}", value, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> ConfigResult<AppConfig> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.max_upload_bytes, 16_777_216);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            (PORT_VAR, "8080"),
            (TIMEOUT_VAR, " 5 "),
            (PREVIEW_ROWS_VAR, ""),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.preview_rows, 5);
    }

    #[test]
    fn test_invalid_values() {
        assert!(from_map(&[(PORT_VAR, "http")]).is_err());
        assert!(from_map(&[(MAX_UPLOAD_VAR, "-1")]).is_err());
        assert!(from_map(&[(TIMEOUT_VAR, "0")]).is_err());
    }

    #[test]
    fn test_allowed_files() {
        assert!(is_allowed_file("sales.csv"));
        assert!(is_allowed_file("SALES.CSV"));
        assert!(is_allowed_file("sales.xlsx"));
        assert!(is_allowed_file("legacy.XLS"));
        assert!(!is_allowed_file("sales.ods"));
        assert!(!is_allowed_file("csv"));
    }
}
