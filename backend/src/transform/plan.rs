//! The pipeline spec document: one JSON object describing a whole run.
//!
//! ```json
//! {
//!   "profiler":     {"cardinality_threshold": 0.5},
//!   "rules":        [{"rule_kind": "not_null", "column": "id"}],
//!   "stages":       [{"stage_kind": "trim_normalize"}],
//!   "calculations": [{"name": "total", "operation": "sum", "columns": ["q1", "q2"]}],
//!   "aggregations": [{"metric_kind": "mean", "column": "total"}],
//!   "pivots":       [{"index": ["region"], "values": "total", "metric_kind": "sum"}]
//! }
//! ```
//!
//! Every section is optional. Unknown kinds, missing parameters and
//! parameters that fail their checks are rejected while parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pipeline::StageSpec;
use super::stages::{CleaningStage, ImputeStrategy, ImputeTarget, TextCase};
use crate::aggregate::{AggregationSpec, Metric, PivotSpec, PivotSpecDef};
use crate::calculate::{Calculation, CalculationRule, Condition, Operator};
use crate::error::{ConfigError, ConfigResult};
use crate::models::SemanticType;
use crate::profile::ProfilerOptions;
use crate::validation::ValidationRule;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiler: Option<ProfilerOptions>,

    #[serde(default)]
    pub rules: Vec<ValidationRule>,

    #[serde(default)]
    pub stages: Vec<StageSpec>,

    #[serde(default)]
    pub calculations: Vec<CalculationRule>,

    #[serde(default)]
    pub aggregations: Vec<AggregationSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pivots: Vec<PivotSpec>,
}

impl PipelineSpec {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Profiler options, defaulted when the document has none.
    pub fn profiler_options(&self) -> ProfilerOptions {
        self.profiler.clone().unwrap_or_default()
    }

    pub fn with_stage(mut self, stage: CleaningStage) -> ConfigResult<Self> {
        self.stages.push(StageSpec::new(stage)?);
        Ok(self)
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_calculation(mut self, rule: CalculationRule) -> Self {
        self.calculations.push(rule);
        self
    }

    pub fn with_aggregation(mut self, spec: AggregationSpec) -> Self {
        self.aggregations.push(spec);
        self
    }

    pub fn with_pivot(mut self, def: PivotSpecDef) -> ConfigResult<Self> {
        self.pivots.push(PivotSpec::try_from(def)?);
        Ok(self)
    }
}

/// A spec exercising every section, printed by `excel-cleaner example-spec`.
pub fn example_spec() -> Result<PipelineSpec, ConfigError> {
    let spec = PipelineSpec {
        profiler: Some(ProfilerOptions::default()),
        ..PipelineSpec::default()
    }
    .with_rule(ValidationRule::not_null("id"))
    .with_rule(ValidationRule::uniqueness("id"))
    .with_rule(ValidationRule::range("age", Some(0.0), Some(120.0))?)
    .with_rule(ValidationRule::pattern("email", r"[^@\s]+@[^@\s]+\.[a-z]+")?)
    .with_stage(CleaningStage::TrimNormalize {
        columns: None,
        case: Some(TextCase::Title),
    })?
    .with_stage(CleaningStage::ImputeMissing {
        targets: vec![
            ImputeTarget {
                column: "age".to_string(),
                strategy: ImputeStrategy::Median,
            },
            ImputeTarget {
                column: "id".to_string(),
                strategy: ImputeStrategy::DropRow,
            },
        ],
    })?
    .with_stage(CleaningStage::Deduplicate {
        subset: Some(vec!["id".to_string()]),
    })?
    .with_stage(CleaningStage::CoerceType {
        column: "signup".to_string(),
        target: SemanticType::Datetime,
        strict: false,
        format: Some("%d/%m/%Y".to_string()),
    })?
    .with_stage(CleaningStage::CapOutliers {
        columns: Some(vec!["amount".to_string()]),
        k: 1.5,
    })?
    .with_calculation(CalculationRule::new(
        "big_spender",
        Calculation::If {
            column: "amount".to_string(),
            condition: Condition::new(Operator::Ge, Value::from(1000))?,
            then: "yes".into(),
            otherwise: "no".into(),
        },
    )?)
    .with_aggregation(AggregationSpec::new(Metric::Mean, "amount", vec!["region".to_string()])?)
    .with_aggregation(AggregationSpec::new(Metric::Percentile { p: 0.9 }, "amount", Vec::new())?)
    .with_aggregation(AggregationSpec::new(Metric::Count, "id", Vec::new())?)
    .with_pivot(PivotSpecDef {
        index: vec!["region".to_string()],
        columns: vec!["big_spender".to_string()],
        values: "amount".to_string(),
        metric: Metric::Sum,
        fill_value: Some(0.0),
        margins: true,
        margins_name: "Total".to_string(),
    })?;

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_example_spec_round_trip() {
        let spec = example_spec().unwrap();
        let json = spec.to_json().unwrap();
        let parsed = PipelineSpec::from_json(&json).unwrap();

        assert_eq!(parsed.rules.len(), 4);
        assert_eq!(parsed.stages, spec.stages);
        assert_eq!(parsed.calculations, spec.calculations);
        assert_eq!(parsed.aggregations, spec.aggregations);
        assert_eq!(parsed.pivots, spec.pivots);
    }

    #[test]
    fn test_pivot_section() {
        let spec = PipelineSpec::from_value(&json!({
            "pivots": [{"index": ["region"], "columns": ["year"], "values": "amount", "metric_kind": "sum", "margins": true}]
        }))
        .unwrap();
        assert_eq!(spec.pivots.len(), 1);
        assert_eq!(PivotSpecDef::from(spec.pivots[0].clone()).columns, vec!["year".to_string()]);

        let bad = json!({"pivots": [{"index": [], "values": "amount", "metric_kind": "sum"}]});
        assert!(PipelineSpec::from_value(&bad).is_err());
    }

    #[test]
    fn test_sections_are_optional() {
        let spec = PipelineSpec::from_json("{}").unwrap();
        assert!(spec.stages.is_empty());
        assert_eq!(spec.profiler_options(), ProfilerOptions::default());
    }

    #[test]
    fn test_rejects_unknown_kinds() {
        let bad = json!({"stages": [{"stage_kind": "shuffle"}]});
        assert!(matches!(PipelineSpec::from_value(&bad), Err(ConfigError::Malformed(_))));

        let bad = json!({"aggregations": [{"metric_kind": "mode", "column": "x"}]});
        assert!(PipelineSpec::from_value(&bad).is_err());

        let bad = json!({"rules": [{"rule_kind": "range", "column": "x"}]});
        assert!(PipelineSpec::from_value(&bad).is_err());

        let bad = json!({"calculations": [{"name": "x", "operation": "product", "columns": ["a"]}]});
        assert!(PipelineSpec::from_value(&bad).is_err());
    }
}
