//! Error types for the Excel-Cleaner pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV and workbook loading errors
//! - [`TableError`] - Invalid table shape (ragged or duplicated columns)
//! - [`ConfigError`] - Malformed stage, rule, metric or calculation parameters
//! - [`PipelineError`] - Typed errors raised by cleaning, calculation and aggregation
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::fmt;

use thiserror::Error;

// =============================================================================
// CSV Loading Errors
// =============================================================================

/// Errors while loading a CSV or workbook upload into a table.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the detected encoding.
    #[error("Failed to decode content as {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// The workbook container or worksheet could not be read.
    #[error("Failed to read workbook: {0}")]
    WorkbookError(#[from] calamine::Error),

    /// The loaded rows do not form a valid table.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Table Shape Errors
// =============================================================================

/// Errors raised when building a [`crate::models::Table`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    /// Two columns share a name.
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    /// A column length differs from the first column.
    #[error("Column '{column}' has {found} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },

    /// A row has more or fewer cells than there are headers.
    #[error("Row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in a stage, rule, metric or calculation definition.
///
/// Raised when a spec is constructed (or deserialized), never while running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A required parameter is absent.
    #[error("Missing required parameter '{parameter}' for {kind}")]
    MissingParameter { kind: String, parameter: String },

    /// A parameter is present but unusable.
    #[error("Invalid parameter '{parameter}' for {kind}: {message}")]
    InvalidParameter {
        kind: String,
        parameter: String,
        message: String,
    },

    /// A regular expression failed to compile.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The pipeline spec document could not be parsed.
    #[error("Malformed spec: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn missing(kind: &str, parameter: &str) -> Self {
        Self::MissingParameter {
            kind: kind.to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub fn invalid(kind: &str, parameter: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            kind: kind.to_string(),
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// Where in a run an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSite {
    /// Cleaning stage, by position in the stage list.
    Stage(usize),
    /// Derived-column calculation, by position.
    Calculation(usize),
    /// Aggregation spec, by position.
    Aggregation(usize),
    /// Pivot spec, by position.
    Pivot(usize),
}

impl fmt::Display for ErrorSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSite::Stage(i) => write!(f, "stage #{}", i),
            ErrorSite::Calculation(i) => write!(f, "calculation #{}", i),
            ErrorSite::Aggregation(i) => write!(f, "aggregation #{}", i),
            ErrorSite::Pivot(i) => write!(f, "pivot #{}", i),
        }
    }
}

/// Typed errors raised by the cleaning pipeline, the calculation engine and
/// the aggregation engine.
///
/// This is the main error type returned by [`crate::report::analyze`].
/// Any of these aborts the run: no partial table or report is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A spec references a column the table does not have (or, for derived
    /// columns, one it already has).
    #[error("{site}: {message} '{column}'")]
    Schema {
        site: ErrorSite,
        column: String,
        message: String,
    },

    /// The operation is incompatible with the column's type, or a strict
    /// coercion failed.
    #[error("{site}: column '{column}' {message}")]
    TypeMismatch {
        site: ErrorSite,
        column: String,
        message: String,
    },

    /// A spec is malformed.
    #[error("{site}: {source}")]
    Configuration {
        site: ErrorSite,
        #[source]
        source: ConfigError,
    },

    /// The cancellation token fired between steps.
    #[error("Run cancelled after {completed} completed step(s)")]
    Cancelled { completed: usize },

    /// An intermediate table could not be built.
    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl PipelineError {
    pub fn unknown_column(site: ErrorSite, column: impl Into<String>) -> Self {
        Self::Schema {
            site,
            column: column.into(),
            message: "unknown column".to_string(),
        }
    }

    pub fn type_mismatch(site: ErrorSite, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            site,
            column: column.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable tag, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema { .. } => "schema_error",
            PipelineError::TypeMismatch { .. } => "type_mismatch_error",
            PipelineError::Configuration { .. } => "configuration_error",
            PipelineError::Cancelled { .. } => "cancelled_error",
            PipelineError::Table(_) => "table_error",
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Upload could not be loaded.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Spec document could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeded the configured size.
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for spec construction.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> ServerError
        let csv_err = CsvError::EmptyFile;
        let server_err: ServerError = csv_err.into();
        assert!(server_err.to_string().contains("empty"));

        // PipelineError -> ServerError
        let pipeline_err = PipelineError::unknown_column(ErrorSite::Stage(2), "age");
        let server_err: ServerError = pipeline_err.into();
        assert!(server_err.to_string().contains("age"));
        assert!(server_err.to_string().contains("stage #2"));
    }

    #[test]
    fn test_type_mismatch_format() {
        let err = PipelineError::type_mismatch(
            ErrorSite::Aggregation(1),
            "city",
            "is categorical, sum requires numeric",
        );
        let msg = err.to_string();
        assert!(msg.contains("aggregation #1"));
        assert!(msg.contains("city"));
        assert_eq!(err.kind(), "type_mismatch_error");
    }

    #[test]
    fn test_configuration_error_keeps_source() {
        let err = PipelineError::Configuration {
            site: ErrorSite::Stage(0),
            source: ConfigError::missing("range", "min or max"),
        };
        assert!(err.to_string().contains("min or max"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
