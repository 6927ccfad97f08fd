//! Derived columns computed row by row, appended to the cleaned table.
//!
//! | Operation | Parameters                                          | New cell                               |
//! |-----------|-----------------------------------------------------|----------------------------------------|
//! | `sum`     | `columns`                                           | sum of the numeric cells of the row    |
//! | `count`   | `columns`                                           | number of non-missing cells of the row |
//! | `countif` | `column`, `condition`                               | 1 when the condition holds, else 0     |
//! | `sumif`   | `condition_column`, `sum_column`, `condition`       | `sum_column` value when it holds, else 0 |
//! | `if`      | `column`, `condition`, `then`, `else`               | `then` or `else`                       |
//!
//! Every rule names its output with `name`, which must not clash with an
//! existing column.

mod condition;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use condition::{Condition, ConditionDef, Operator};

use crate::api::logs::{log_info, log_info_indent, log_success};
use crate::error::{ConfigError, ErrorSite, PipelineError, PipelineResult};
use crate::models::{CellValue, Column, Table};
use crate::profile::{column_type, is_numeric_column};

/// The operation part of a calculation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Calculation {
    Sum {
        columns: Vec<String>,
    },
    Count {
        columns: Vec<String>,
    },
    #[serde(rename = "countif")]
    CountIf {
        column: String,
        condition: Condition,
    },
    #[serde(rename = "sumif")]
    SumIf {
        condition_column: String,
        sum_column: String,
        condition: Condition,
    },
    If {
        column: String,
        condition: Condition,
        #[serde(default)]
        then: CellValue,
        #[serde(default, rename = "else")]
        otherwise: CellValue,
    },
}

impl Calculation {
    pub fn kind(&self) -> &'static str {
        match self {
            Calculation::Sum { .. } => "sum",
            Calculation::Count { .. } => "count",
            Calculation::CountIf { .. } => "countif",
            Calculation::SumIf { .. } => "sumif",
            Calculation::If { .. } => "if",
        }
    }

    fn describe(&self) -> String {
        match self {
            Calculation::Sum { columns } => format!("sum of [{}]", columns.join(", ")),
            Calculation::Count { columns } => format!("non-missing count of [{}]", columns.join(", ")),
            Calculation::CountIf { column, condition } => format!("1 if '{}' {} else 0", column, condition.describe()),
            Calculation::SumIf {
                condition_column,
                sum_column,
                condition,
            } => format!("'{}' if '{}' {} else 0", sum_column, condition_column, condition.describe()),
            Calculation::If {
                column,
                condition,
                then,
                otherwise,
            } => format!("if '{}' {} then {} else {}", column, condition.describe(), then, otherwise),
        }
    }
}

/// A named derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalculationRuleDef")]
pub struct CalculationRule {
    pub name: String,
    #[serde(flatten)]
    pub calculation: Calculation,
}

#[derive(Deserialize)]
struct CalculationRuleDef {
    name: String,
    #[serde(flatten)]
    calculation: Calculation,
}

impl TryFrom<CalculationRuleDef> for CalculationRule {
    type Error = ConfigError;

    fn try_from(def: CalculationRuleDef) -> Result<Self, Self::Error> {
        Self::new(def.name, def.calculation)
    }
}

impl CalculationRule {
    pub fn new(name: impl Into<String>, calculation: Calculation) -> Result<Self, ConfigError> {
        let name = name.into();
        let kind = calculation.kind();
        if name.trim().is_empty() {
            return Err(ConfigError::missing(kind, "name"));
        }
        match &calculation {
            Calculation::Sum { columns } | Calculation::Count { columns } if columns.is_empty() => {
                return Err(ConfigError::invalid(kind, "columns", "at least one column is required"));
            }
            _ => {}
        }
        Ok(Self { name, calculation })
    }
}

/// One line of the calculation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationLogEntry {
    pub index: usize,
    pub name: String,
    pub operation: String,
    pub details: String,
}

/// Append one column per rule, in order. Later rules may read columns added
/// by earlier ones.
pub fn apply_calculations(
    table: &Table,
    rules: &[CalculationRule],
    cancel: &CancellationToken,
) -> PipelineResult<(Table, Vec<CalculationLogEntry>)> {
    if rules.is_empty() {
        return Ok((table.clone(), Vec::new()));
    }
    log_info(format!("🧮 Calculations: {} rule(s)", rules.len()));

    let mut current = table.clone();
    let mut log = Vec::with_capacity(rules.len());

    for (index, rule) in rules.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { completed: index });
        }
        let site = ErrorSite::Calculation(index);

        let values = evaluate(&current, rule, site)?;
        current = current.with_column_appended(Column::new(rule.name.clone(), values))?;

        let details = rule.calculation.describe();
        log_info_indent(format!("[{}] {} = {}", index, rule.name, details), 1);
        log.push(CalculationLogEntry {
            index,
            name: rule.name.clone(),
            operation: rule.calculation.kind().to_string(),
            details,
        });
    }

    log_success(format!("Added {} derived column(s)", log.len()));
    Ok((current, log))
}

fn source_column<'t>(table: &'t Table, name: &str, site: ErrorSite) -> PipelineResult<&'t [CellValue]> {
    table
        .column(name)
        .map(Column::values)
        .ok_or_else(|| PipelineError::unknown_column(site, name))
}

fn numeric_column<'t>(table: &'t Table, name: &str, site: ErrorSite, kind: &str) -> PipelineResult<&'t [CellValue]> {
    let column = table
        .column(name)
        .ok_or_else(|| PipelineError::unknown_column(site, name))?;
    if !is_numeric_column(column) {
        return Err(PipelineError::type_mismatch(
            site,
            name,
            format!("is {}, {} requires numeric", column_type(column), kind),
        ));
    }
    Ok(column.values())
}

fn evaluate(table: &Table, rule: &CalculationRule, site: ErrorSite) -> PipelineResult<Vec<CellValue>> {
    if table.column(&rule.name).is_some() {
        return Err(PipelineError::Schema {
            site,
            column: rule.name.clone(),
            message: "column already exists".to_string(),
        });
    }

    let kind = rule.calculation.kind();
    let lookup = |name: &str| source_column(table, name, site);
    let numeric = |name: &str| numeric_column(table, name, site, kind);

    let rows = table.row_count();
    let values = match &rule.calculation {
        Calculation::Sum { columns } => {
            let sources = columns.iter().map(|c| numeric(c.as_str())).collect::<PipelineResult<Vec<_>>>()?;
            (0..rows)
                .map(|r| CellValue::Number(sources.iter().filter_map(|col| col[r].as_number()).sum()))
                .collect()
        }
        Calculation::Count { columns } => {
            let sources = columns.iter().map(|c| lookup(c.as_str())).collect::<PipelineResult<Vec<_>>>()?;
            (0..rows)
                .map(|r| CellValue::Number(sources.iter().filter(|col| !col[r].is_missing()).count() as f64))
                .collect()
        }
        Calculation::CountIf { column, condition } => {
            let source = lookup(column.as_str())?;
            source
                .iter()
                .map(|cell| CellValue::Number(if condition.matches(cell) { 1.0 } else { 0.0 }))
                .collect()
        }
        Calculation::SumIf {
            condition_column,
            sum_column,
            condition,
        } => {
            let tested = lookup(condition_column.as_str())?;
            let summed = numeric(sum_column.as_str())?;
            tested
                .iter()
                .zip(summed)
                .map(|(test, value)| {
                    let n = if condition.matches(test) { value.as_number().unwrap_or(0.0) } else { 0.0 };
                    CellValue::Number(n)
                })
                .collect()
        }
        Calculation::If {
            column,
            condition,
            then,
            otherwise,
        } => {
            let source = lookup(column.as_str())?;
            source
                .iter()
                .map(|cell| if condition.matches(cell) { then.clone() } else { otherwise.clone() })
                .collect()
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales() -> Table {
        Table::new(vec![
            Column::new("region", vec!["north".into(), "south".into(), "north".into(), CellValue::Null]),
            Column::new("q1", vec!["10".into(), "20".into(), CellValue::Null, "5".into()]),
            Column::new("q2", vec!["1".into(), "2".into(), "3".into(), CellValue::Null]),
        ])
        .unwrap()
    }

    fn rules(value: serde_json::Value) -> Vec<CalculationRule> {
        serde_json::from_value(value).unwrap()
    }

    fn column_numbers(table: &Table, name: &str) -> Vec<Option<f64>> {
        table.column(name).unwrap().values().iter().map(CellValue::as_number).collect()
    }

    #[test]
    fn test_sum_and_count() {
        let rules = rules(json!([
            {"name": "total", "operation": "sum", "columns": ["q1", "q2"]},
            {"name": "filled", "operation": "count", "columns": ["region", "q1", "q2"]}
        ]));
        let (table, log) = apply_calculations(&sales(), &rules, &CancellationToken::new()).unwrap();

        assert_eq!(column_numbers(&table, "total"), vec![Some(11.0), Some(22.0), Some(3.0), Some(5.0)]);
        assert_eq!(column_numbers(&table, "filled"), vec![Some(3.0), Some(3.0), Some(2.0), Some(1.0)]);
        assert_eq!(table.column_names(), vec!["region", "q1", "q2", "total", "filled"]);
        assert_eq!(log[1].operation, "count");
    }

    #[test]
    fn test_conditional_operations() {
        let rules = rules(json!([
            {"name": "is_north", "operation": "countif", "column": "region",
             "condition": {"operator": "==", "value": "north"}},
            {"name": "north_q2", "operation": "sumif", "condition_column": "region", "sum_column": "q2",
             "condition": {"operator": "==", "value": "north"}},
            {"name": "tier", "operation": "if", "column": "q1",
             "condition": {"operator": ">=", "value": 15}, "then": "high", "else": "low"}
        ]));
        let (table, _) = apply_calculations(&sales(), &rules, &CancellationToken::new()).unwrap();

        assert_eq!(column_numbers(&table, "is_north"), vec![Some(1.0), Some(0.0), Some(1.0), Some(0.0)]);
        assert_eq!(column_numbers(&table, "north_q2"), vec![Some(1.0), Some(0.0), Some(3.0), Some(0.0)]);
        let tiers: Vec<String> = table.column("tier").unwrap().values().iter().map(|v| v.to_string()).collect();
        assert_eq!(tiers, vec!["low", "high", "low", "low"]);
    }

    #[test]
    fn test_chained_rules_see_new_columns() {
        let rules = rules(json!([
            {"name": "total", "operation": "sum", "columns": ["q1", "q2"]},
            {"name": "big", "operation": "countif", "column": "total",
             "condition": {"operator": ">", "value": 10}}
        ]));
        let (table, _) = apply_calculations(&sales(), &rules, &CancellationToken::new()).unwrap();
        assert_eq!(column_numbers(&table, "big"), vec![Some(1.0), Some(1.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_errors_carry_site() {
        let clash = rules(json!([{"name": "q1", "operation": "sum", "columns": ["q2"]}]));
        let err = apply_calculations(&sales(), &clash, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { site: ErrorSite::Calculation(0), .. }));

        let unknown = rules(json!([
            {"name": "a", "operation": "count", "columns": ["q1"]},
            {"name": "b", "operation": "sum", "columns": ["nope"]}
        ]));
        let err = apply_calculations(&sales(), &unknown, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { site: ErrorSite::Calculation(1), .. }));

        let text_sum = rules(json!([{"name": "a", "operation": "sum", "columns": ["region"]}]));
        let err = apply_calculations(&sales(), &text_sum, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(serde_json::from_value::<CalculationRule>(json!({"name": "x", "operation": "sum", "columns": []})).is_err());
        assert!(serde_json::from_value::<CalculationRule>(json!({"name": "", "operation": "count", "columns": ["a"]})).is_err());
        assert!(serde_json::from_value::<CalculationRule>(json!({"name": "x", "operation": "custom", "columns": ["a"]})).is_err());
        assert!(serde_json::from_value::<CalculationRule>(json!({"name": "x", "operation": "countif", "column": "a"})).is_err());
    }

    #[test]
    fn test_cancelled_between_rules() {
        let token = CancellationToken::new();
        token.cancel();
        let rules = rules(json!([{"name": "a", "operation": "count", "columns": ["q1"]}]));
        let err = apply_calculations(&sales(), &rules, &token).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { completed: 0 }));
    }
}
