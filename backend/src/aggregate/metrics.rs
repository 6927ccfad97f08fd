use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::CellValue;
use crate::stats;

/// Statistic computed by an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric_kind", rename_all = "snake_case")]
pub enum Metric {
    Sum,
    Mean,
    Median,
    StdDev,
    /// `p` is a fraction in `[0, 1]`.
    Percentile { p: f64 },
    Count,
    Min,
    Max,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Sum => "sum",
            Metric::Mean => "mean",
            Metric::Median => "median",
            Metric::StdDev => "std_dev",
            Metric::Percentile { .. } => "percentile",
            Metric::Count => "count",
            Metric::Min => "min",
            Metric::Max => "max",
        }
    }

    /// Check the metric's own parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Metric::Percentile { p } = self {
            if !(0.0..=1.0).contains(p) {
                return Err(ConfigError::invalid(self.as_str(), "p", format!("{p} is outside [0, 1]")));
            }
        }
        Ok(())
    }

    /// Label used in logs, `percentile(0.9)` style.
    pub fn label(&self) -> String {
        match self {
            Metric::Percentile { p } => format!("percentile({p})"),
            m => m.as_str().to_string(),
        }
    }

    /// Everything except `count` reads the column as numbers.
    pub fn needs_numeric(&self) -> bool {
        !matches!(self, Metric::Count)
    }

    /// Evaluate over the cells of one group. Missing cells are ignored.
    pub fn compute(&self, cells: &[&CellValue]) -> Option<f64> {
        if let Metric::Count = self {
            return Some(cells.iter().filter(|c| !c.is_missing()).count() as f64);
        }

        let values: Vec<f64> = cells.iter().filter_map(|c| c.as_number()).collect();
        match self {
            Metric::Sum => Some(values.iter().sum()),
            Metric::Mean => stats::mean(&values),
            Metric::Median => stats::median(&values),
            Metric::StdDev => stats::sample_std_dev(&values),
            Metric::Percentile { p } => stats::quantile(&values, *p),
            Metric::Min => values.iter().copied().reduce(f64::min),
            Metric::Max => values.iter().copied().reduce(f64::max),
            Metric::Count => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(metric: Metric, values: &[CellValue]) -> Option<f64> {
        let refs: Vec<&CellValue> = values.iter().collect();
        metric.compute(&refs)
    }

    #[test]
    fn test_numeric_metrics() {
        let values: Vec<CellValue> = vec![4.0.into(), "1".into(), CellValue::Null, 3.0.into(), 2.0.into()];

        assert_eq!(compute(Metric::Sum, &values), Some(10.0));
        assert_eq!(compute(Metric::Mean, &values), Some(2.5));
        assert_eq!(compute(Metric::Median, &values), Some(2.5));
        assert_eq!(compute(Metric::Min, &values), Some(1.0));
        assert_eq!(compute(Metric::Max, &values), Some(4.0));
        assert_eq!(compute(Metric::Count, &values), Some(4.0));
        assert_eq!(compute(Metric::Percentile { p: 0.25 }, &values), Some(1.75));

        let sd = compute(Metric::StdDev, &values).unwrap();
        assert!((sd - 1.290_994).abs() < 1e-6);
    }

    #[test]
    fn test_empty_group() {
        let empty: Vec<CellValue> = vec![CellValue::Null];
        assert_eq!(compute(Metric::Sum, &empty), Some(0.0));
        assert_eq!(compute(Metric::Count, &empty), Some(0.0));
        assert_eq!(compute(Metric::Mean, &empty), None);
        assert_eq!(compute(Metric::Min, &empty), None);
        assert_eq!(compute(Metric::Percentile { p: 0.9 }, &empty), None);
        assert_eq!(compute(Metric::StdDev, &[1.0.into()]), None);
    }

    #[test]
    fn test_wire_names() {
        let m: Metric = serde_json::from_str(r#"{"metric_kind": "std_dev"}"#).unwrap();
        assert_eq!(m, Metric::StdDev);
        let p: Metric = serde_json::from_str(r#"{"metric_kind": "percentile", "p": 0.9}"#).unwrap();
        assert_eq!(p.as_str(), "percentile");
        assert!(serde_json::from_str::<Metric>(r#"{"metric_kind": "percentile"}"#).is_err());
        assert!(serde_json::from_str::<Metric>(r#"{"metric_kind": "variance"}"#).is_err());
    }
}
