//! Pivot tables: one metric laid out over row keys by column keys.
//!
//! ```json
//! {"index": ["region"], "columns": ["quarter"], "values": "amount",
//!  "metric_kind": "sum", "fill_value": 0, "margins": true}
//! ```
//!
//! Rows with a missing cell in any `index` or `columns` key are left out and
//! counted. Row and column keys keep their order of first appearance. A grid
//! cell with no rows (or a metric that is undefined there) takes
//! `fill_value`, or stays null without one.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::grouper::group_rows;
use super::metrics::Metric;
use crate::api::logs::{log_info, log_info_indent, log_warning_indent};
use crate::error::{ConfigError, ErrorSite, PipelineError, PipelineResult};
use crate::models::{CellValue, Column, Table};
use crate::profile::{column_type, is_numeric_column};

fn default_margins_name() -> String {
    "Total".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotSpecDef {
    pub index: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub values: String,
    #[serde(flatten)]
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f64>,
    #[serde(default)]
    pub margins: bool,
    #[serde(default = "default_margins_name")]
    pub margins_name: String,
}

/// A checked pivot request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PivotSpecDef", into = "PivotSpecDef")]
pub struct PivotSpec {
    index: Vec<String>,
    columns: Vec<String>,
    values: String,
    metric: Metric,
    fill_value: Option<f64>,
    margins: bool,
    margins_name: String,
}

impl TryFrom<PivotSpecDef> for PivotSpec {
    type Error = ConfigError;

    fn try_from(def: PivotSpecDef) -> Result<Self, Self::Error> {
        let kind = "pivot";
        if def.index.is_empty() {
            return Err(ConfigError::missing(kind, "index"));
        }
        if def.index.iter().chain(&def.columns).any(|c| c.trim().is_empty()) {
            return Err(ConfigError::invalid(kind, "index/columns", "empty column name"));
        }
        if def.values.trim().is_empty() {
            return Err(ConfigError::missing(kind, "values"));
        }
        def.metric.validate()?;
        if def.fill_value.is_some_and(|v| !v.is_finite()) {
            return Err(ConfigError::invalid(kind, "fill_value", "must be a finite number"));
        }
        if def.margins && def.margins_name.trim().is_empty() {
            return Err(ConfigError::invalid(kind, "margins_name", "must not be empty"));
        }

        Ok(Self {
            index: def.index,
            columns: def.columns,
            values: def.values,
            metric: def.metric,
            fill_value: def.fill_value,
            margins: def.margins,
            margins_name: def.margins_name,
        })
    }
}

impl From<PivotSpec> for PivotSpecDef {
    fn from(spec: PivotSpec) -> Self {
        PivotSpecDef {
            index: spec.index,
            columns: spec.columns,
            values: spec.values,
            metric: spec.metric,
            fill_value: spec.fill_value,
            margins: spec.margins,
            margins_name: spec.margins_name,
        }
    }
}

impl PivotSpec {
    fn describe(&self) -> String {
        let mut out = format!("{}({}) by {}", self.metric.label(), self.values, self.index.join(", "));
        if !self.columns.is_empty() {
            out.push_str(&format!(" x {}", self.columns.join(", ")));
        }
        out
    }
}

/// One row of a pivot grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRow {
    pub key: Vec<CellValue>,
    /// One cell per entry of [`PivotTable::column_keys`].
    pub cells: Vec<Option<f64>>,
}

/// Totals over whole rows, whole columns and the whole grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotMargins {
    pub name: String,
    pub row_totals: Vec<Option<f64>>,
    pub column_totals: Vec<Option<f64>>,
    pub grand_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    pub spec_index: usize,
    pub metric_kind: String,
    pub values: String,
    pub index: Vec<String>,
    pub columns: Vec<String>,
    /// Column key tuples; a single empty tuple when `columns` is empty.
    pub column_keys: Vec<Vec<CellValue>>,
    pub rows: Vec<PivotRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margins: Option<PivotMargins>,
    /// Rows left out for a missing key cell.
    pub ungroupable: usize,
}

/// Build every pivot over `table`, in the order given.
pub fn run_pivots(table: &Table, specs: &[PivotSpec], cancel: &CancellationToken) -> PipelineResult<Vec<PivotTable>> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }
    log_info(format!("🧮 Pivot tables: {} spec(s)", specs.len()));

    let mut out = Vec::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { completed: index });
        }
        log_info_indent(format!("[{}] {}", index, spec.describe()), 1);
        out.push(pivot(table, spec, index)?);
    }
    Ok(out)
}

fn key_columns<'t>(table: &'t Table, names: &[String], site: ErrorSite) -> PipelineResult<Vec<&'t [CellValue]>> {
    names
        .iter()
        .map(|name| {
            table
                .column(name)
                .map(Column::values)
                .ok_or_else(|| PipelineError::unknown_column(site, name.as_str()))
        })
        .collect()
}

fn pivot(table: &Table, spec: &PivotSpec, spec_index: usize) -> PipelineResult<PivotTable> {
    let site = ErrorSite::Pivot(spec_index);

    let target = table
        .column(&spec.values)
        .ok_or_else(|| PipelineError::unknown_column(site, spec.values.as_str()))?;
    if spec.metric.needs_numeric() && !is_numeric_column(target) {
        return Err(PipelineError::type_mismatch(
            site,
            spec.values.as_str(),
            format!("is {}, {} requires numeric", column_type(target), spec.metric.as_str()),
        ));
    }

    let mut keys = key_columns(table, &spec.index, site)?;
    keys.extend(key_columns(table, &spec.columns, site)?);
    let groups = group_rows(&keys, table.row_count());
    let split = spec.index.len();

    let column_keys: IndexSet<Vec<CellValue>> = groups.buckets.keys().map(|key| key[split..].to_vec()).collect();
    let mut grid: IndexMap<Vec<CellValue>, Vec<Vec<usize>>> = IndexMap::new();
    for (key, rows) in &groups.buckets {
        let (row_key, column_key) = key.split_at(split);
        let Some(position) = column_keys.get_index_of(column_key) else {
            continue;
        };
        let cells = grid
            .entry(row_key.to_vec())
            .or_insert_with(|| vec![Vec::new(); column_keys.len()]);
        cells[position].extend_from_slice(rows);
    }

    let values = target.values();
    let evaluate = |rows: &[usize]| -> Option<f64> {
        if rows.is_empty() {
            return spec.fill_value;
        }
        let cells: Vec<&CellValue> = rows.iter().map(|&r| &values[r]).collect();
        spec.metric.compute(&cells).or(spec.fill_value)
    };

    let rows: Vec<PivotRow> = grid
        .iter()
        .map(|(key, cells)| PivotRow {
            key: key.clone(),
            cells: cells.iter().map(|rows| evaluate(rows.as_slice())).collect(),
        })
        .collect();

    let margins = spec.margins.then(|| {
        let row_totals = grid.values().map(|cells| evaluate(cells.concat().as_slice())).collect();
        let column_totals = (0..column_keys.len())
            .map(|pos| {
                let rows: Vec<usize> = grid.values().flat_map(|cells| cells[pos].iter().copied()).collect();
                evaluate(rows.as_slice())
            })
            .collect();
        let all: Vec<usize> = groups.buckets.values().flatten().copied().collect();
        PivotMargins {
            name: spec.margins_name.clone(),
            row_totals,
            column_totals,
            grand_total: evaluate(all.as_slice()),
        }
    });

    if groups.ungroupable > 0 {
        log_warning_indent(format!("{} row(s) with a missing key left out", groups.ungroupable), 2);
    }

    Ok(PivotTable {
        spec_index,
        metric_kind: spec.metric.as_str().to_string(),
        values: spec.values.clone(),
        index: spec.index.clone(),
        columns: spec.columns.clone(),
        column_keys: column_keys.into_iter().collect(),
        rows,
        margins,
        ungroupable: groups.ungroupable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> Table {
        Table::new(vec![
            Column::new(
                "region",
                vec!["north".into(), "south".into(), "north".into(), "south".into(), CellValue::Null, "north".into()],
            ),
            Column::new(
                "quarter",
                vec!["q1".into(), "q1".into(), "q2".into(), "q1".into(), "q2".into(), "q1".into()],
            ),
            Column::new(
                "amount",
                vec!["10".into(), "20".into(), "30".into(), "5".into(), "99".into(), "1".into()],
            ),
        ])
        .unwrap()
    }

    fn run(value: serde_json::Value) -> PipelineResult<PivotTable> {
        let spec: PivotSpec = serde_json::from_value(value).unwrap();
        let mut out = run_pivots(&sales(), &[spec], &CancellationToken::new())?;
        Ok(out.remove(0))
    }

    #[test]
    fn test_grid_with_fill_and_margins() {
        let table = run(json!({
            "index": ["region"], "columns": ["quarter"], "values": "amount",
            "metric_kind": "sum", "fill_value": 0, "margins": true
        }))
        .unwrap();

        assert_eq!(
            table.column_keys,
            vec![vec![CellValue::text("q1")], vec![CellValue::text("q2")]]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].key, vec![CellValue::text("north")]);
        assert_eq!(table.rows[0].cells, vec![Some(11.0), Some(30.0)]);
        // south has no q2 rows
        assert_eq!(table.rows[1].cells, vec![Some(25.0), Some(0.0)]);
        assert_eq!(table.ungroupable, 1);

        let margins = table.margins.unwrap();
        assert_eq!(margins.name, "Total");
        assert_eq!(margins.row_totals, vec![Some(41.0), Some(25.0)]);
        assert_eq!(margins.column_totals, vec![Some(36.0), Some(30.0)]);
        assert_eq!(margins.grand_total, Some(66.0));
    }

    #[test]
    fn test_missing_combination_without_fill_is_null() {
        let table = run(json!({
            "index": ["region"], "columns": ["quarter"], "values": "amount", "metric_kind": "mean"
        }))
        .unwrap();
        assert_eq!(table.rows[1].cells, vec![Some(12.5), None]);
        assert!(table.margins.is_none());
    }

    #[test]
    fn test_without_columns_matches_grouped_metric() {
        let table = run(json!({"index": ["region"], "values": "amount", "metric_kind": "count"})).unwrap();
        assert_eq!(table.column_keys, vec![Vec::<CellValue>::new()]);
        assert_eq!(table.rows[0].cells, vec![Some(3.0)]);
        assert_eq!(table.rows[1].cells, vec![Some(2.0)]);
    }

    #[test]
    fn test_errors_carry_site() {
        let err = run(json!({"index": ["country"], "values": "amount", "metric_kind": "sum"})).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { site: ErrorSite::Pivot(0), .. }));

        let err = run(json!({"index": ["quarter"], "values": "region", "metric_kind": "sum"})).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { site: ErrorSite::Pivot(0), .. }));
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let parse = |v: serde_json::Value| serde_json::from_value::<PivotSpec>(v);
        assert!(parse(json!({"index": [], "values": "a", "metric_kind": "sum"})).is_err());
        assert!(parse(json!({"index": ["r"], "values": "", "metric_kind": "sum"})).is_err());
        assert!(parse(json!({"index": ["r"], "values": "a", "metric_kind": "percentile", "p": 2.0})).is_err());
        assert!(parse(json!({"index": ["r"], "values": "a"})).is_err());
    }
}
