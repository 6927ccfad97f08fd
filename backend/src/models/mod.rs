//! Domain models for the Excel-Cleaner pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`CellValue`] - Tagged cell value (number, text, datetime, boolean, null)
//! - [`Table`] / [`Column`] - Columnar table with shared column storage
//! - [`SemanticType`] - Inferred or target column type
//! - [`Violation`] - A validation finding on one cell
//! - [`AggregationResult`] - One computed metric for one group

use serde::{Deserialize, Serialize};

mod table;
mod value;

pub use table::{Column, Table, TablePreview};
pub use value::{
    format_number, parse_boolean, parse_datetime, parse_datetime_with, parse_number, CellValue,
};

// =============================================================================
// Semantic Type
// =============================================================================

/// Semantic type of a column, as inferred by the profiler or requested by
/// `coerce_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Text,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Datetime => "datetime",
            SemanticType::Boolean => "boolean",
            SemanticType::Text => "text",
        }
    }

    /// Text and categorical columns hold free-form strings.
    pub fn is_textual(&self) -> bool {
        matches!(self, SemanticType::Text | SemanticType::Categorical)
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Validation Findings
// =============================================================================

/// What a [`Violation`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Range,
    Pattern,
    Uniqueness,
    NotNull,
    /// Non-numeric cell in a numeric column, found while checking a range.
    TypeMismatch,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Range => "range",
            ViolationKind::Pattern => "pattern",
            ViolationKind::Uniqueness => "uniqueness",
            ViolationKind::NotNull => "not_null",
            ViolationKind::TypeMismatch => "type_mismatch",
        }
    }
}

/// One rule failing on one cell. Produced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// 0-based data row (header excluded).
    pub row_index: usize,
    pub column: String,
    /// Position of the rule in the rule list.
    pub rule_index: usize,
    #[serde(rename = "ruleKind")]
    pub kind: ViolationKind,
    pub message: String,
}

// =============================================================================
// Aggregation Output
// =============================================================================

/// One metric computed over one group (or the whole table).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Position of the aggregation spec in the `aggregations` list.
    pub spec_index: usize,
    /// Values of the group_by columns; empty when ungrouped.
    pub group_key: Vec<CellValue>,
    pub metric_kind: String,
    pub column: String,
    /// `None` when the metric is undefined (e.g. std_dev of one value).
    pub value: Option<f64>,
}

/// Rows left out of a grouped spec because a group_by cell was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UngroupableRows {
    pub spec_index: usize,
    pub count: usize,
}
