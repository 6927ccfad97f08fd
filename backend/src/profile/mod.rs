//! Column profiling.
//!
//! Inspects the raw cells of every column and derives its semantic type plus
//! the basic statistics downstream stages rely on (null count, cardinality,
//! min/max, sample values). Profiling is a pure read and never fails.
//!
//! # Example
//!
//! ```rust,ignore
//! use excel_cleaner::profile::{profile_table, ProfilerOptions};
//!
//! let profiles = profile_table(&table, &ProfilerOptions::default());
//! for (name, profile) in &profiles {
//!     println!("{}: {} ({} nulls)", name, profile.inferred_type, profile.null_count);
//! }
//! ```

mod inference;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::models::{CellValue, Column, SemanticType, Table};
use crate::stats;

pub use inference::infer_type;

/// Profiles keyed by column name, in column order.
pub type TableProfile = IndexMap<String, ColumnProfile>;

/// Profiler tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerOptions {
    /// Distinct/row ratio below which a string column is categorical.
    #[serde(default = "default_cardinality_threshold")]
    pub cardinality_threshold: f64,

    /// How many distinct sample values to keep per column.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_cardinality_threshold() -> f64 {
    0.5
}

fn default_sample_size() -> usize {
    5
}

impl Default for ProfilerOptions {
    fn default() -> Self {
        Self {
            cardinality_threshold: default_cardinality_threshold(),
            sample_size: default_sample_size(),
        }
    }
}

/// Mean / spread of a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: Option<f64>,
}

/// What the profiler learned about one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: SemanticType,
    pub row_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    pub min: Option<CellValue>,
    pub max: Option<CellValue>,
    pub sample_values: Vec<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
}

impl ColumnProfile {
    pub fn null_percentage(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.row_count as f64 * 100.0
        }
    }
}

/// Profile every column of `table`.
pub fn profile_table(table: &Table, options: &ProfilerOptions) -> TableProfile {
    table
        .columns()
        .iter()
        .map(|col| (col.name().to_string(), profile_column(col, options)))
        .collect()
}

/// Profile a single column.
pub fn profile_column(column: &Column, options: &ProfilerOptions) -> ColumnProfile {
    let values = column.values();

    let mut distinct: IndexSet<&CellValue> = IndexSet::new();
    let mut null_count = 0;
    for v in values {
        if v.is_missing() {
            null_count += 1;
        } else {
            distinct.insert(v);
        }
    }

    let inferred_type = column
        .declared_type()
        .unwrap_or_else(|| infer_type(values, distinct.len(), options.cardinality_threshold));
    let (min, max) = min_max(values, inferred_type);

    let numeric = if inferred_type == SemanticType::Numeric {
        let numbers = numeric_values(values);
        match (stats::mean(&numbers), stats::median(&numbers)) {
            (Some(mean), Some(median)) => Some(NumericSummary {
                mean,
                median,
                std_dev: stats::sample_std_dev(&numbers),
            }),
            _ => None,
        }
    } else {
        None
    };

    ColumnProfile {
        name: column.name().to_string(),
        inferred_type,
        row_count: values.len(),
        null_count,
        distinct_count: distinct.len(),
        min,
        max,
        sample_values: distinct.iter().take(options.sample_size).map(|v| (*v).clone()).collect(),
        numeric,
    }
}

/// Type of one column: its declared type if it has one, otherwise the type
/// inferred under the default options.
///
/// Cleaning stages use this to decide which columns they touch; text and
/// categorical are told apart by cardinality only, which none of them care
/// about.
pub fn column_type(column: &Column) -> SemanticType {
    if let Some(ty) = column.declared_type() {
        return ty;
    }
    let values = column.values();
    let distinct: IndexSet<&CellValue> = values.iter().filter(|v| !v.is_missing()).collect();
    infer_type(values, distinct.len(), default_cardinality_threshold())
}

/// Whether numeric operations accept `column`.
///
/// A declared column is numeric only when declared so. Otherwise every
/// non-missing cell must read as a number; an all-missing column qualifies,
/// numeric operations over it simply see no values.
pub fn is_numeric_column(column: &Column) -> bool {
    match column.declared_type() {
        Some(ty) => ty == SemanticType::Numeric,
        None => column
            .values()
            .iter()
            .filter(|v| !v.is_missing())
            .all(|v| v.as_number().is_some()),
    }
}

/// Numeric readings of the non-missing cells, in row order.
pub fn numeric_values(values: &[CellValue]) -> Vec<f64> {
    values
        .iter()
        .filter(|v| !v.is_missing())
        .filter_map(CellValue::as_number)
        .collect()
}

fn min_max(values: &[CellValue], ty: SemanticType) -> (Option<CellValue>, Option<CellValue>) {
    let present = values.iter().filter(|v| !v.is_missing());
    match ty {
        SemanticType::Numeric => {
            let nums: Vec<f64> = present.filter_map(CellValue::as_number).collect();
            let min = nums.iter().copied().min_by(|a, b| a.total_cmp(b));
            let max = nums.iter().copied().max_by(|a, b| a.total_cmp(b));
            (min.map(CellValue::Number), max.map(CellValue::Number))
        }
        SemanticType::Datetime => {
            let dts: Vec<_> = present.filter_map(CellValue::as_datetime).collect();
            (
                dts.iter().min().copied().map(CellValue::DateTime),
                dts.iter().max().copied().map(CellValue::DateTime),
            )
        }
        SemanticType::Boolean => {
            let bools: Vec<bool> = present.filter_map(CellValue::as_boolean).collect();
            (
                bools.iter().min().copied().map(CellValue::Boolean),
                bools.iter().max().copied().map(CellValue::Boolean),
            )
        }
        SemanticType::Categorical | SemanticType::Text => {
            let strings: Vec<String> = present.map(|v| v.to_string()).collect();
            (
                strings.iter().min().cloned().map(CellValue::Text),
                strings.iter().max().cloned().map(CellValue::Text),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let rows = vec![
            vec!["25", "north", "2024-01-05", "yes", "alpha"],
            vec!["", "south", "2024-02-10", "no", "beta"],
            vec!["35", "north", "", "yes", "gamma"],
            vec!["25", "north", "2023-12-31", "", "delta"],
        ];
        let rows = rows
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .map(|s| if s.is_empty() { CellValue::Null } else { CellValue::text(s) })
                    .collect()
            })
            .collect();
        Table::from_rows(
            vec!["age".into(), "region".into(), "joined".into(), "active".into(), "code".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn test_profile_types_in_column_order() {
        let profiles = profile_table(&table(), &ProfilerOptions::default());
        let types: Vec<_> = profiles.values().map(|p| p.inferred_type).collect();
        assert_eq!(
            types,
            vec![
                SemanticType::Numeric,
                SemanticType::Categorical,
                SemanticType::Datetime,
                SemanticType::Boolean,
                SemanticType::Text,
            ]
        );
        assert_eq!(profiles.keys().next().map(String::as_str), Some("age"));
    }

    #[test]
    fn test_numeric_stats() {
        let profiles = profile_table(&table(), &ProfilerOptions::default());
        let age = &profiles["age"];
        assert_eq!(age.null_count, 1);
        assert_eq!(age.distinct_count, 2);
        assert_eq!(age.min, Some(CellValue::Number(25.0)));
        assert_eq!(age.max, Some(CellValue::Number(35.0)));
        let numeric = age.numeric.as_ref().unwrap();
        assert!((numeric.mean - 85.0 / 3.0).abs() < 1e-9);
        assert_eq!(numeric.median, 25.0);
        assert!((age.null_percentage() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_samples_are_distinct_and_bounded() {
        let options = ProfilerOptions { sample_size: 1, ..ProfilerOptions::default() };
        let profiles = profile_table(&table(), &options);
        assert_eq!(profiles["region"].sample_values, vec![CellValue::text("north")]);
        assert_eq!(profiles["region"].min, Some(CellValue::text("north")));
        assert_eq!(profiles["region"].max, Some(CellValue::text("south")));
    }

    #[test]
    fn test_all_null_column() {
        let t = Table::from_rows(vec!["empty".into()], vec![vec![CellValue::Null], vec![CellValue::text("")]]).unwrap();
        let p = &profile_table(&t, &ProfilerOptions::default())["empty"];
        assert_eq!(p.inferred_type, SemanticType::Text);
        assert_eq!(p.null_count, 2);
        assert_eq!(p.null_count, p.row_count);
        assert_eq!(p.min, None);
        assert!(is_numeric_column(&t.columns()[0]));
    }

    #[test]
    fn test_column_type_and_numeric_check() {
        let t = table();
        assert_eq!(column_type(&t.columns()[0]), SemanticType::Numeric);
        assert!(is_numeric_column(&t.columns()[0]));
        assert!(!is_numeric_column(&t.columns()[1]));
    }

    #[test]
    fn test_declared_type_wins_over_inference() {
        let zip = Column::new("zip", vec![CellValue::text("10001"), CellValue::text("10002")]);
        assert_eq!(column_type(&zip), SemanticType::Numeric);

        let zip = zip.with_declared_type(SemanticType::Text);
        assert_eq!(column_type(&zip), SemanticType::Text);
        assert!(!is_numeric_column(&zip));

        let profile = profile_column(&zip, &ProfilerOptions::default());
        assert_eq!(profile.inferred_type, SemanticType::Text);
        assert!(profile.numeric.is_none());
        assert_eq!(profile.min, Some(CellValue::text("10001")));

        let codes = Column::new("code", vec![CellValue::text("a"), CellValue::text("b")])
            .with_declared_type(SemanticType::Categorical);
        assert_eq!(profile_column(&codes, &ProfilerOptions::default()).inferred_type, SemanticType::Categorical);
    }
}
