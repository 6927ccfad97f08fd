//! Scalar and grouped statistics over the cleaned table.
//!
//! Each [`AggregationSpec`] names a metric, a column and optionally a list of
//! `group_by` columns:
//!
//! ```json
//! {"metric_kind": "percentile", "p": 0.9, "column": "amount", "group_by": ["region"]}
//! ```
//!
//! An ungrouped spec yields exactly one [`AggregationResult`] with an empty
//! key. A grouped spec yields one result per key tuple present in the data,
//! in order of first appearance, plus an [`UngroupableRows`] count for rows
//! whose key had a missing cell.
//!
//! [`PivotSpec`] lays one metric out over row keys by column keys, with
//! optional fill value and margins.

mod grouper;
mod metrics;
mod pivot;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use grouper::{group_rows, Groups};
pub use metrics::Metric;
pub use pivot::{run_pivots, PivotMargins, PivotRow, PivotSpec, PivotSpecDef, PivotTable};

use crate::api::logs::{log_info, log_info_indent, log_success, log_warning_indent};
use crate::error::{ConfigError, ErrorSite, PipelineError, PipelineResult};
use crate::models::{AggregationResult, CellValue, Column, Table, UngroupableRows};
use crate::profile::{column_type, is_numeric_column};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSpecDef {
    #[serde(flatten)]
    pub metric: Metric,
    pub column: String,
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// A checked aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AggregationSpecDef", into = "AggregationSpecDef")]
pub struct AggregationSpec {
    metric: Metric,
    column: String,
    group_by: Vec<String>,
}

impl TryFrom<AggregationSpecDef> for AggregationSpec {
    type Error = ConfigError;

    fn try_from(def: AggregationSpecDef) -> Result<Self, Self::Error> {
        Self::new(def.metric, def.column, def.group_by)
    }
}

impl From<AggregationSpec> for AggregationSpecDef {
    fn from(spec: AggregationSpec) -> Self {
        AggregationSpecDef {
            metric: spec.metric,
            column: spec.column,
            group_by: spec.group_by,
        }
    }
}

impl AggregationSpec {
    pub fn new(metric: Metric, column: impl Into<String>, group_by: Vec<String>) -> Result<Self, ConfigError> {
        let kind = metric.as_str();
        let column = column.into();
        if column.trim().is_empty() {
            return Err(ConfigError::missing(kind, "column"));
        }
        metric.validate()?;
        if group_by.iter().any(|g| g.trim().is_empty()) {
            return Err(ConfigError::invalid(kind, "group_by", "empty column name"));
        }
        Ok(Self { metric, column, group_by })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    fn describe(&self) -> String {
        let metric = self.metric.label();
        if self.group_by.is_empty() {
            format!("{}({})", metric, self.column)
        } else {
            format!("{}({}) by {}", metric, self.column, self.group_by.join(", "))
        }
    }
}

/// Aggregation results in spec order, then group order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutput {
    pub results: Vec<AggregationResult>,
    pub ungroupable: Vec<UngroupableRows>,
}

/// Evaluate every spec against `table`.
pub fn run_aggregations(
    table: &Table,
    specs: &[AggregationSpec],
    cancel: &CancellationToken,
) -> PipelineResult<AggregationOutput> {
    let mut output = AggregationOutput::default();
    if specs.is_empty() {
        return Ok(output);
    }
    log_info(format!("📊 Aggregations: {} spec(s)", specs.len()));

    for (index, spec) in specs.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { completed: index });
        }
        let site = ErrorSite::Aggregation(index);
        log_info_indent(format!("[{}] {}", index, spec.describe()), 1);

        let target = table
            .column(&spec.column)
            .ok_or_else(|| PipelineError::unknown_column(site, spec.column.as_str()))?;
        if spec.metric.needs_numeric() && !is_numeric_column(target) {
            return Err(PipelineError::type_mismatch(
                site,
                spec.column.as_str(),
                format!("is {}, {} requires numeric", column_type(target), spec.metric.as_str()),
            ));
        }

        let keys = spec
            .group_by
            .iter()
            .map(|name| {
                table
                    .column(name)
                    .map(Column::values)
                    .ok_or_else(|| PipelineError::unknown_column(site, name.as_str()))
            })
            .collect::<PipelineResult<Vec<&[CellValue]>>>()?;

        let groups = group_rows(&keys, table.row_count());
        let values = target.values();

        for (key, rows) in groups.buckets {
            let cells: Vec<&CellValue> = rows.iter().map(|&r| &values[r]).collect();
            output.results.push(AggregationResult {
                spec_index: index,
                group_key: key,
                metric_kind: spec.metric.as_str().to_string(),
                column: spec.column.clone(),
                value: spec.metric.compute(&cells),
            });
        }

        if !spec.group_by.is_empty() {
            if groups.ungroupable > 0 {
                log_warning_indent(format!("{} row(s) with a missing group key", groups.ungroupable), 2);
            }
            output.ungroupable.push(UngroupableRows {
                spec_index: index,
                count: groups.ungroupable,
            });
        }
    }

    log_success(format!("{} aggregation result(s)", output.results.len()));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SemanticType;
    use serde_json::json;

    fn sales() -> Table {
        Table::new(vec![
            Column::new(
                "region",
                vec!["north".into(), "south".into(), "north".into(), CellValue::Null, "east".into()],
            ),
            Column::new("amount", vec!["10".into(), "20".into(), "30".into(), "5".into(), CellValue::Null]),
            Column::new("note", vec!["x".into(), CellValue::Null, "y".into(), "z".into(), "w".into()]),
        ])
        .unwrap()
    }

    fn specs(value: serde_json::Value) -> Vec<AggregationSpec> {
        serde_json::from_value(value).unwrap()
    }

    fn run(value: serde_json::Value) -> PipelineResult<AggregationOutput> {
        run_aggregations(&sales(), &specs(value), &CancellationToken::new())
    }

    #[test]
    fn test_ungrouped_mean_and_count() {
        let out = run(json!([
            {"metric_kind": "mean", "column": "amount"},
            {"metric_kind": "count", "column": "note"}
        ]))
        .unwrap();

        assert_eq!(out.results.len(), 2);
        assert!(out.results[0].group_key.is_empty());
        assert_eq!(out.results[0].value, Some(16.25));
        assert_eq!(out.results[1].value, Some(4.0));
        assert!(out.ungroupable.is_empty());
    }

    #[test]
    fn test_grouped_sum() {
        let out = run(json!([
            {"metric_kind": "sum", "column": "amount", "group_by": ["region"]}
        ]))
        .unwrap();

        let rows: Vec<(String, Option<f64>)> = out
            .results
            .iter()
            .map(|r| (r.group_key[0].to_string(), r.value))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("north".to_string(), Some(40.0)),
                ("south".to_string(), Some(20.0)),
                ("east".to_string(), Some(0.0)),
            ]
        );
        assert_eq!(out.ungroupable, vec![UngroupableRows { spec_index: 0, count: 1 }]);
    }

    #[test]
    fn test_empty_group_mean_is_null() {
        let out = run(json!([
            {"metric_kind": "mean", "column": "amount", "group_by": ["region"]}
        ]))
        .unwrap();
        assert_eq!(out.results[2].group_key, vec![CellValue::text("east")]);
        assert_eq!(out.results[2].value, None);
    }

    #[test]
    fn test_sum_on_text_declared_column_is_type_mismatch() {
        let zip = Column::new("zip", vec!["10001".into(), "10002".into()]).with_declared_type(SemanticType::Text);
        let table = Table::new(vec![zip]).unwrap();
        let specs = specs(json!([
            {"metric_kind": "count", "column": "zip"},
            {"metric_kind": "sum", "column": "zip"}
        ]));

        match run_aggregations(&table, &specs, &CancellationToken::new()) {
            Err(PipelineError::TypeMismatch { site, column, .. }) => {
                assert_eq!(site, ErrorSite::Aggregation(1));
                assert_eq!(column, "zip");
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_schema_and_type_errors() {
        let err = run(json!([
            {"metric_kind": "count", "column": "amount"},
            {"metric_kind": "sum", "column": "amount", "group_by": ["nope"]}
        ]))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Schema { site: ErrorSite::Aggregation(1), .. }));

        let err = run(json!([{"metric_kind": "max", "column": "note"}])).unwrap_err();
        match err {
            PipelineError::TypeMismatch { site, column, .. } => {
                assert_eq!(site, ErrorSite::Aggregation(0));
                assert_eq!(column, "note");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let bad = json!([{"metric_kind": "percentile", "p": 1.5, "column": "amount"}]);
        assert!(serde_json::from_value::<Vec<AggregationSpec>>(bad).is_err());
        let bad = json!([{"metric_kind": "sum", "column": ""}]);
        assert!(serde_json::from_value::<Vec<AggregationSpec>>(bad).is_err());
        assert!(AggregationSpec::new(Metric::Percentile { p: f64::NAN }, "x", vec![]).is_err());
    }

    #[test]
    fn test_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let specs = specs(json!([{"metric_kind": "count", "column": "note"}]));
        let err = run_aggregations(&sales(), &specs, &token).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { completed: 0 }));
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let spec = AggregationSpec::new(Metric::Percentile { p: 0.9 }, "amount", vec!["region".into()]).unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            json!({"metric_kind": "percentile", "p": 0.9, "column": "amount", "group_by": ["region"]})
        );
    }
}
