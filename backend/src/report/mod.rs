//! Report assembly and the `analyze` entry point.
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │ Table  │──▶│ Profiler │──▶│ Validate │──▶│   Clean   │──▶│ Calculate │──┐
//! └────────┘   └──────────┘   └──────────┘   └───────────┘   └───────────┘  │
//!                                                                           ▼
//!                                   ┌────────┐   ┌──────────────────────────┐
//!                                   │ Report │◀──│ Aggregate + pivot        │
//!                                   └────────┘   └──────────────────────────┘
//! ```
//!
//! Profiling and validation look at the source table and never fail; the
//! remaining steps stop the run on the first error.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{run_aggregations, run_pivots, PivotTable};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::calculate::{apply_calculations, CalculationLogEntry};
use crate::error::PipelineResult;
use crate::models::{AggregationResult, Table, UngroupableRows, Violation};
use crate::profile::{profile_table, ProfilerOptions, TableProfile};
use crate::transform::{run_pipeline, CleaningLogEntry, PipelineSpec};
use crate::validation::validate;

/// Shape and column profiles of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub profiles: TableProfile,
}

impl TableSummary {
    pub fn of(table: &Table, options: &ProfilerOptions) -> Self {
        Self {
            row_count: table.row_count(),
            column_count: table.column_count(),
            profiles: profile_table(table, options),
        }
    }
}

/// Everything a run produced, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub source_summary: TableSummary,
    pub cleaned_summary: TableSummary,
    pub violations: Vec<Violation>,
    pub cleaning_log: Vec<CleaningLogEntry>,
    pub calculation_log: Vec<CalculationLogEntry>,
    pub aggregation_results: Vec<AggregationResult>,
    pub ungroupable_rows: Vec<UngroupableRows>,
    pub pivot_tables: Vec<PivotTable>,
}

/// A finished run: the report and the table it describes.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: Report,
    /// Cleaned table with derived columns appended.
    pub cleaned: Table,
}

/// Run the whole flow over `table`.
pub fn analyze(table: &Table, spec: &PipelineSpec, cancel: &CancellationToken) -> PipelineResult<Analysis> {
    log_info(format!(
        "🔎 Analyzing {} rows x {} columns",
        table.row_count(),
        table.column_count()
    ));
    let options = spec.profiler_options();

    let source_summary = TableSummary::of(table, &options);
    let violations = validate(table, &spec.rules, &source_summary.profiles);
    if !violations.is_empty() {
        log_warning(format!("{} violation(s) in the source table", violations.len()));
    }

    let cleaning = run_pipeline(table, &spec.stages, cancel)?;
    let (cleaned, calculation_log) = apply_calculations(&cleaning.table, &spec.calculations, cancel)?;
    let aggregation = run_aggregations(&cleaned, &spec.aggregations, cancel)?;
    let pivot_tables = run_pivots(&cleaned, &spec.pivots, cancel)?;

    let report = Report {
        source_summary,
        cleaned_summary: TableSummary::of(&cleaned, &options),
        violations,
        cleaning_log: cleaning.log,
        calculation_log,
        aggregation_results: aggregation.results,
        ungroupable_rows: aggregation.ungroupable,
        pivot_tables,
    };
    log_success("Analysis complete");

    Ok(Analysis { report, cleaned })
}
