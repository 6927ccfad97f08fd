//! Cleaning stages.
//!
//! Each stage consumes a table and returns a new one; columns a stage does
//! not rewrite are shared with its input.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, ErrorSite, PipelineError, PipelineResult};
use crate::models::{
    format_number, parse_boolean, parse_datetime, parse_datetime_with, parse_number, CellValue, SemanticType, Table,
};
use crate::profile::{column_type, is_numeric_column, numeric_values};
use crate::stats;

/// Letter case applied by `trim_normalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    Upper,
    Lower,
    Title,
}

/// How `impute_missing` fills (or drops) missing cells of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
    Constant { value: CellValue },
    DropRow,
}

impl ImputeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImputeStrategy::Mean => "mean",
            ImputeStrategy::Median => "median",
            ImputeStrategy::Mode => "mode",
            ImputeStrategy::Constant { .. } => "constant",
            ImputeStrategy::DropRow => "drop_row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputeTarget {
    pub column: String,
    #[serde(flatten)]
    pub strategy: ImputeStrategy,
}

/// All available cleaning stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage_kind", rename_all = "snake_case")]
pub enum CleaningStage {
    /// Trim and collapse whitespace in text columns, optionally re-case.
    TrimNormalize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case: Option<TextCase>,
    },

    /// Fill or drop missing cells, per target column.
    ImputeMissing { targets: Vec<ImputeTarget> },

    /// Drop repeated rows, keeping the first occurrence.
    Deduplicate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subset: Option<Vec<String>>,
    },

    /// Convert a column to a semantic type. The column keeps the target as
    /// its declared type for every later step.
    CoerceType {
        column: String,
        target: SemanticType,
        #[serde(default)]
        strict: bool,
        /// chrono layout, datetime targets only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },

    /// Clip values outside the Tukey fences.
    ///
    /// Fences come from observed quartiles (see [`stats::iqr_bounds`]), so a
    /// second pass over the output finds nothing left to clip.
    CapOutliers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        #[serde(default = "default_k")]
        k: f64,
    },
}

fn default_k() -> f64 {
    1.5
}

/// What a stage produced.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub table: Table,
    pub cells_changed: usize,
    pub notes: Vec<String>,
}

impl StageOutput {
    fn unchanged(table: &Table, notes: Vec<String>) -> Self {
        Self {
            table: table.clone(),
            cells_changed: 0,
            notes,
        }
    }
}

impl CleaningStage {
    pub fn kind(&self) -> &'static str {
        match self {
            CleaningStage::TrimNormalize { .. } => "trim_normalize",
            CleaningStage::ImputeMissing { .. } => "impute_missing",
            CleaningStage::Deduplicate { .. } => "deduplicate",
            CleaningStage::CoerceType { .. } => "coerce_type",
            CleaningStage::CapOutliers { .. } => "cap_outliers",
        }
    }

    /// Reject parameters no table could satisfy.
    pub fn validate(&self) -> ConfigResult<()> {
        let kind = self.kind();
        let non_empty = |param: &str, list: &Option<Vec<String>>| match list {
            Some(names) if names.is_empty() => Err(ConfigError::invalid(kind, param, "must not be empty")),
            _ => Ok(()),
        };

        match self {
            CleaningStage::TrimNormalize { columns, .. } => non_empty("columns", columns),
            CleaningStage::Deduplicate { subset } => non_empty("subset", subset),
            CleaningStage::ImputeMissing { targets } => {
                if targets.is_empty() {
                    return Err(ConfigError::missing(kind, "targets"));
                }
                for target in targets {
                    if target.column.trim().is_empty() {
                        return Err(ConfigError::invalid(kind, "column", "must not be empty"));
                    }
                    if let ImputeStrategy::Constant { value } = &target.strategy {
                        if value.is_missing() {
                            return Err(ConfigError::invalid(
                                kind,
                                "value",
                                format!("constant for '{}' must not be missing", target.column),
                            ));
                        }
                    }
                }
                Ok(())
            }
            CleaningStage::CoerceType { target, format, .. } => match format {
                Some(f) if f.trim().is_empty() => Err(ConfigError::invalid(kind, "format", "must not be empty")),
                Some(_) if *target != SemanticType::Datetime => Err(ConfigError::invalid(
                    kind,
                    "format",
                    format!("only applies to datetime targets, not {}", target),
                )),
                _ => Ok(()),
            },
            CleaningStage::CapOutliers { columns, k } => {
                if !k.is_finite() || *k < 0.0 {
                    return Err(ConfigError::invalid(kind, "k", format!("must be >= 0, got {}", k)));
                }
                non_empty("columns", columns)
            }
        }
    }

    /// Short human-readable summary for logs.
    pub fn describe(&self) -> String {
        match self {
            CleaningStage::TrimNormalize { columns, case } => {
                let scope = columns.as_ref().map_or("text columns".to_string(), |c| c.join(", "));
                match case {
                    Some(case) => format!("trim_normalize [{}] case={:?}", scope, case),
                    None => format!("trim_normalize [{}]", scope),
                }
            }
            CleaningStage::ImputeMissing { targets } => {
                let parts: Vec<String> = targets
                    .iter()
                    .map(|t| format!("{}={}", t.column, t.strategy.as_str()))
                    .collect();
                format!("impute_missing [{}]", parts.join(", "))
            }
            CleaningStage::Deduplicate { subset } => match subset {
                Some(cols) => format!("deduplicate on [{}]", cols.join(", ")),
                None => "deduplicate on all columns".to_string(),
            },
            CleaningStage::CoerceType { column, target, strict, .. } => {
                format!("coerce_type {} -> {}{}", column, target, if *strict { " (strict)" } else { "" })
            }
            CleaningStage::CapOutliers { columns, k } => {
                let scope = columns.as_ref().map_or("numeric columns".to_string(), |c| c.join(", "));
                format!("cap_outliers [{}] k={}", scope, k)
            }
        }
    }

    /// Run the stage against `table`. Errors carry `site`.
    pub fn apply(&self, table: &Table, site: ErrorSite) -> PipelineResult<StageOutput> {
        self.validate()
            .map_err(|source| PipelineError::Configuration { site, source })?;

        match self {
            CleaningStage::TrimNormalize { columns, case } => trim_normalize(table, columns.as_deref(), *case, site),
            CleaningStage::ImputeMissing { targets } => impute_missing(table, targets, site),
            CleaningStage::Deduplicate { subset } => deduplicate(table, subset.as_deref(), site),
            CleaningStage::CoerceType {
                column,
                target,
                strict,
                format,
            } => coerce_type(table, column, *target, *strict, format.as_deref(), site),
            CleaningStage::CapOutliers { columns, k } => cap_outliers(table, columns.as_deref(), *k, site),
        }
    }
}

fn require_column(table: &Table, name: &str, site: ErrorSite) -> PipelineResult<usize> {
    table
        .column_index(name)
        .ok_or_else(|| PipelineError::unknown_column(site, name))
}

fn require_columns(table: &Table, names: &[String], site: ErrorSite) -> PipelineResult<Vec<usize>> {
    names.iter().map(|n| require_column(table, n, site)).collect()
}

// =============================================================================
// trim_normalize
// =============================================================================

/// Trim, collapse inner whitespace runs to one space, then apply `case`.
pub fn normalize_text(s: &str, case: Option<TextCase>) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    match case {
        None => collapsed,
        Some(TextCase::Upper) => collapsed.to_uppercase(),
        Some(TextCase::Lower) => collapsed.to_lowercase(),
        Some(TextCase::Title) => collapsed
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" "),
    }
}

fn trim_normalize(
    table: &Table,
    columns: Option<&[String]>,
    case: Option<TextCase>,
    site: ErrorSite,
) -> PipelineResult<StageOutput> {
    let targets = match columns {
        Some(names) => require_columns(table, names, site)?,
        None => (0..table.column_count()).collect(),
    };

    let mut out = table.clone();
    let mut cells_changed = 0;
    let mut notes = Vec::new();

    for idx in targets {
        let column = &table.columns()[idx];
        let ty = column_type(column);
        if !ty.is_textual() {
            if columns.is_some() {
                notes.push(format!("'{}' is {}, left untouched", column.name(), ty));
            }
            continue;
        }

        let mut changed = 0;
        let values: Vec<CellValue> = column
            .values()
            .iter()
            .map(|cell| match cell {
                CellValue::Text(s) => {
                    let normalized = normalize_text(s, case);
                    if normalized != *s {
                        changed += 1;
                    }
                    CellValue::Text(normalized)
                }
                other => other.clone(),
            })
            .collect();

        if changed > 0 {
            out = out.with_column_values(idx, values)?;
            notes.push(format!("'{}': {} cell(s) normalized", column.name(), changed));
            cells_changed += changed;
        }
    }

    Ok(StageOutput {
        table: out,
        cells_changed,
        notes,
    })
}

// =============================================================================
// impute_missing
// =============================================================================

/// Most frequent non-missing value; ties go to the value seen first.
///
/// Numeric columns count by numeric value, so "25" and "25.0" agree, and the
/// winner comes back as a native number.
fn mode_of(values: &[CellValue], numeric: bool) -> Option<CellValue> {
    let mut counts: IndexMap<CellValue, usize> = IndexMap::new();
    for cell in values.iter().filter(|v| !v.is_missing()) {
        let key = match (numeric, cell.as_number()) {
            (true, Some(n)) => CellValue::Number(n),
            _ => cell.clone(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut best: Option<(&CellValue, usize)> = None;
    for (value, &count) in &counts {
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value.clone())
}

fn impute_missing(table: &Table, targets: &[ImputeTarget], site: ErrorSite) -> PipelineResult<StageOutput> {
    let mut working = table.clone();
    let mut cells_changed = 0;
    let mut notes = Vec::new();
    let mut drop_columns = Vec::new();

    for target in targets {
        let idx = require_column(table, &target.column, site)?;
        // statistics always come from the stage input
        let source = &table.columns()[idx];
        let has_values = source.values().iter().any(|v| !v.is_missing());

        let fill = match &target.strategy {
            ImputeStrategy::DropRow => {
                drop_columns.push(idx);
                continue;
            }
            ImputeStrategy::Constant { value } => value.clone(),
            ImputeStrategy::Mean | ImputeStrategy::Median => {
                let strategy = &target.strategy;
                if !has_values {
                    notes.push(format!("'{}': no values to derive a {}, left untouched", target.column, strategy.as_str()));
                    continue;
                }
                if !is_numeric_column(source) {
                    return Err(PipelineError::type_mismatch(
                        site,
                        &target.column,
                        format!("is {}, {} imputation requires numeric", column_type(source), strategy.as_str()),
                    ));
                }
                let numbers = numeric_values(source.values());
                let stat = match strategy {
                    ImputeStrategy::Mean => stats::mean(&numbers),
                    _ => stats::median(&numbers),
                };
                match stat {
                    Some(v) => CellValue::Number(v),
                    None => continue,
                }
            }
            ImputeStrategy::Mode => match mode_of(source.values(), is_numeric_column(source)) {
                Some(v) => v,
                None => {
                    notes.push(format!("'{}': no values to derive a mode, left untouched", target.column));
                    continue;
                }
            },
        };

        let current = &working.columns()[idx];
        let mut filled = 0;
        let values: Vec<CellValue> = current
            .values()
            .iter()
            .map(|cell| {
                if cell.is_missing() {
                    filled += 1;
                    fill.clone()
                } else {
                    cell.clone()
                }
            })
            .collect();

        if filled > 0 {
            working = working.with_column_values(idx, values)?;
            notes.push(format!(
                "'{}': filled {} cell(s) with {} ({})",
                target.column,
                filled,
                target.strategy.as_str(),
                fill
            ));
            cells_changed += filled;
        }
    }

    if !drop_columns.is_empty() {
        let keep: Vec<usize> = (0..working.row_count())
            .filter(|&row| {
                drop_columns
                    .iter()
                    .all(|&idx| working.columns()[idx].values().get(row).is_some_and(|c| !c.is_missing()))
            })
            .collect();
        let dropped = working.row_count() - keep.len();
        if dropped > 0 {
            working = working.select_rows(&keep);
            notes.push(format!("dropped {} row(s) with missing values", dropped));
        }
    }

    Ok(StageOutput {
        table: working,
        cells_changed,
        notes,
    })
}

// =============================================================================
// deduplicate
// =============================================================================

fn deduplicate(table: &Table, subset: Option<&[String]>, site: ErrorSite) -> PipelineResult<StageOutput> {
    let key_columns = match subset {
        Some(names) => require_columns(table, names, site)?,
        None => (0..table.column_count()).collect(),
    };

    let mut seen = std::collections::HashSet::new();
    let keep: Vec<usize> = (0..table.row_count())
        .filter(|&row| {
            let key: Vec<&CellValue> = key_columns
                .iter()
                .filter_map(|&idx| table.columns()[idx].values().get(row))
                .collect();
            seen.insert(key)
        })
        .collect();

    let removed = table.row_count() - keep.len();
    if removed == 0 {
        return Ok(StageOutput::unchanged(table, vec!["no duplicates found".to_string()]));
    }

    Ok(StageOutput {
        table: table.select_rows(&keep),
        cells_changed: 0,
        notes: vec![format!("removed {} duplicate row(s)", removed)],
    })
}

// =============================================================================
// coerce_type
// =============================================================================

/// Convert one non-missing cell; `None` when it cannot be read as `target`.
pub fn coerce_cell(cell: &CellValue, target: SemanticType, format: Option<&str>) -> Option<CellValue> {
    match target {
        SemanticType::Numeric => match cell {
            CellValue::Number(n) => Some(CellValue::Number(*n)),
            CellValue::Boolean(b) => Some(CellValue::Number(if *b { 1.0 } else { 0.0 })),
            CellValue::Text(s) => parse_number(s).map(CellValue::Number),
            _ => None,
        },
        SemanticType::Datetime => match cell {
            CellValue::DateTime(dt) => Some(CellValue::DateTime(*dt)),
            CellValue::Text(s) => match format {
                Some(f) => parse_datetime_with(s, f),
                None => parse_datetime(s),
            }
            .map(CellValue::DateTime),
            _ => None,
        },
        SemanticType::Boolean => match cell {
            CellValue::Boolean(b) => Some(CellValue::Boolean(*b)),
            CellValue::Number(n) if *n == 1.0 => Some(CellValue::Boolean(true)),
            CellValue::Number(n) if *n == 0.0 => Some(CellValue::Boolean(false)),
            CellValue::Text(s) => parse_boolean(s).map(CellValue::Boolean),
            _ => None,
        },
        SemanticType::Text | SemanticType::Categorical => match cell {
            CellValue::Null => None,
            CellValue::Text(s) => Some(CellValue::Text(s.clone())),
            other => Some(CellValue::Text(other.to_string())),
        },
    }
}

fn coerce_type(
    table: &Table,
    column: &str,
    target: SemanticType,
    strict: bool,
    format: Option<&str>,
    site: ErrorSite,
) -> PipelineResult<StageOutput> {
    let idx = require_column(table, column, site)?;
    let source = &table.columns()[idx];

    let mut failures = 0;
    let mut values = Vec::with_capacity(source.len());
    for (row, cell) in source.values().iter().enumerate() {
        if cell.is_missing() {
            values.push(CellValue::Null);
            continue;
        }
        match coerce_cell(cell, target, format) {
            Some(v) => values.push(v),
            None if strict => {
                return Err(PipelineError::type_mismatch(
                    site,
                    column,
                    format!("row {}: cannot convert '{}' to {}", row, cell, target),
                ));
            }
            None => {
                failures += 1;
                values.push(CellValue::Null);
            }
        }
    }

    let cells_changed = values.iter().zip(source.values()).filter(|(new, old)| new != old).count();
    let mut notes = Vec::new();
    if failures > 0 {
        notes.push(format!("{} value(s) could not be read as {} and were set to null", failures, target));
    }
    if cells_changed == 0 && source.declared_type() == Some(target) {
        return Ok(StageOutput::unchanged(table, notes));
    }

    notes.insert(0, format!("'{}' converted to {}", column, target));
    let converted = if cells_changed == 0 {
        source.clone()
    } else {
        source.with_values(values)
    };
    Ok(StageOutput {
        table: table.with_column_replaced(idx, converted.with_declared_type(target))?,
        cells_changed,
        notes,
    })
}

// =============================================================================
// cap_outliers
// =============================================================================

fn cap_outliers(table: &Table, columns: Option<&[String]>, k: f64, site: ErrorSite) -> PipelineResult<StageOutput> {
    let targets = match columns {
        Some(names) => {
            let indices = require_columns(table, names, site)?;
            for &idx in &indices {
                let col = &table.columns()[idx];
                if !is_numeric_column(col) {
                    return Err(PipelineError::type_mismatch(
                        site,
                        col.name(),
                        format!("is {}, cap_outliers requires numeric", column_type(col)),
                    ));
                }
            }
            indices
        }
        None => (0..table.column_count())
            .filter(|&idx| column_type(&table.columns()[idx]) == SemanticType::Numeric)
            .collect(),
    };

    let mut out = table.clone();
    let mut cells_changed = 0;
    let mut notes = Vec::new();

    for idx in targets {
        let column = &table.columns()[idx];
        let Some((lo, hi)) = stats::iqr_bounds(&numeric_values(column.values()), k) else {
            continue;
        };

        let mut capped = 0;
        let values: Vec<CellValue> = column
            .values()
            .iter()
            .map(|cell| match cell.as_number() {
                Some(n) if n < lo => {
                    capped += 1;
                    CellValue::Number(lo)
                }
                Some(n) if n > hi => {
                    capped += 1;
                    CellValue::Number(hi)
                }
                _ => cell.clone(),
            })
            .collect();

        if capped > 0 {
            out = out.with_column_values(idx, values)?;
            notes.push(format!(
                "'{}': capped {} value(s) to [{}, {}]",
                column.name(),
                capped,
                format_number(lo),
                format_number(hi)
            ));
            cells_changed += capped;
        }
    }

    Ok(StageOutput {
        table: out,
        cells_changed,
        notes,
    })
}

/// Markdown table of the stages and their parameters (`excel-cleaner stages`).
pub fn stages_description() -> String {
    r#"Available cleaning stages:

| Stage | Description | Parameters |
|-------|-------------|------------|
| trim_normalize | Trim and collapse whitespace in text columns | columns: optional list (default: text columns), case: upper/lower/title |
| impute_missing | Fill or drop missing cells | targets: [{column, strategy: mean/median/mode/constant/drop_row, value (constant only)}] |
| deduplicate | Remove repeated rows, keep the first | subset: optional list of key columns (default: all) |
| coerce_type | Convert a column to a type | column, target: numeric/datetime/boolean/text/categorical, strict: bool, format: chrono layout |
| cap_outliers | Clip values outside Q1 - k*IQR .. Q3 + k*IQR | columns: optional list (default: numeric columns), k: default 1.5 |

Every stage also accepts "enabled": false to skip it.

Example stages in JSON:
[
  {"stage_kind": "trim_normalize", "case": "title"},
  {"stage_kind": "impute_missing", "targets": [{"column": "age", "strategy": "mean"}]},
  {"stage_kind": "deduplicate"},
  {"stage_kind": "coerce_type", "column": "joined", "target": "datetime", "format": "%d/%m/%Y"},
  {"stage_kind": "cap_outliers", "k": 1.5, "enabled": false}
]"#
    .to_string()
}
