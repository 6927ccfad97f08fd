//! # Excel-Cleaner - profile, validate, clean and summarise tabular data
//!
//! Excel-Cleaner takes an uploaded CSV file or Excel workbook, works out what each column
//! holds, checks it against user rules, runs an ordered cleaning pipeline,
//! appends derived columns and computes scalar or grouped statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌────────┐
//! │ CSV/XLSX  │──▶│  Parser  │──▶│ Profiler │──▶│ Validate │──▶│   Clean    │──▶│ Calculate │──▶│ Report │
//! │ (any enc) │   │(auto-enc)│   │ (types)  │   │ (rules)  │   │  (stages)  │   │+ Aggregate│   │ (JSON) │
//! └───────────┘   └──────────┘   └──────────┘   └──────────┘   └────────────┘   └───────────┘   └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use excel_cleaner::{analyze, load_file, PipelineSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! let loaded = load_file("sales.csv")?;
//! let spec = PipelineSpec::from_json(&std::fs::read_to_string("spec.json")?)?;
//! let analysis = analyze(&loaded.table, &spec, &CancellationToken::new())?;
//! println!("{} violations", analysis.report.violations.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, columns, tables and result records
//! - [`parser`] - CSV loading with auto-detection, Excel workbooks
//! - [`profile`] - Column type inference and statistics
//! - [`validation`] - Row-level rule checks
//! - [`transform`] - Cleaning stages, pipeline and spec document
//! - [`calculate`] - Derived columns
//! - [`aggregate`] - Scalar and grouped metrics, pivot tables
//! - [`report`] - Report assembly and the `analyze` entry point
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server and run logs

// Core modules
pub mod error;
pub mod models;
pub mod stats;

// Parsing
pub mod parser;

// Analysis
pub mod profile;
pub mod validation;

// Transformation
pub mod aggregate;
pub mod calculate;
pub mod transform;

// Reporting
pub mod report;

// Runtime
pub mod api;
pub mod config;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, CsvError, ErrorSite, PipelineError, ServerError, TableError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AggregationResult, CellValue, Column, SemanticType, Table, TablePreview, UngroupableRows, Violation,
    ViolationKind,
};

// =============================================================================
// Re-exports - CSV & Workbook Loading
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, load_bytes, load_file, load_upload, load_workbook_bytes,
    parse_table, write_table, LoadedTable,
};

// =============================================================================
// Re-exports - Profiling & Validation
// =============================================================================

pub use profile::{profile_table, ColumnProfile, ProfilerOptions, TableProfile};
pub use validation::{validate, ValidationRule};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use aggregate::{
    run_aggregations, run_pivots, AggregationOutput, AggregationSpec, Metric, PivotMargins, PivotRow, PivotSpec,
    PivotSpecDef, PivotTable,
};
pub use calculate::{apply_calculations, Calculation, CalculationLogEntry, CalculationRule, Condition, Operator};
pub use transform::{
    example_spec, run_pipeline, stages_description, CleaningLogEntry, CleaningOutcome, CleaningStage, PipelineSpec,
    StageSpec,
};

// =============================================================================
// Re-exports - Report
// =============================================================================

pub use report::{analyze, Analysis, Report, TableSummary};

// =============================================================================
// Re-exports - Runtime
// =============================================================================

pub use api::logs::LOG_BROADCASTER;
pub use api::server::start_server;
pub use config::AppConfig;
