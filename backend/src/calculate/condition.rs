//! Row predicates used by `countif`, `sumif` and `if`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::models::CellValue;

/// Comparison operator, written in JSON as `">="`, `"in"` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::In => "in",
            Operator::Contains => "contains",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDef {
    pub operator: Operator,
    pub value: Value,
}

/// `{operator, value}` checked at construction: `in` takes a non-empty list,
/// every other operator a single non-null scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionDef", into = "ConditionDef")]
pub struct Condition {
    operator: Operator,
    operands: Vec<CellValue>,
}

impl TryFrom<ConditionDef> for Condition {
    type Error = ConfigError;

    fn try_from(def: ConditionDef) -> Result<Self, Self::Error> {
        let kind = "condition";
        let operands = match (def.operator, def.value) {
            (Operator::In, Value::Array(items)) if !items.is_empty() => {
                items.iter().map(CellValue::from_json).collect()
            }
            (Operator::In, _) => return Err(ConfigError::invalid(kind, "value", "'in' needs a non-empty list")),
            (_, Value::Null) => return Err(ConfigError::missing(kind, "value")),
            (op, Value::Array(_) | Value::Object(_)) => {
                return Err(ConfigError::invalid(
                    kind,
                    "value",
                    format!("'{}' needs a single value", op.as_str()),
                ))
            }
            (_, scalar) => vec![CellValue::from_json(&scalar)],
        };
        Ok(Self {
            operator: def.operator,
            operands,
        })
    }
}

impl From<Condition> for ConditionDef {
    fn from(cond: Condition) -> Self {
        let value = match cond.operator {
            Operator::In => Value::Array(cond.operands.iter().map(to_json).collect()),
            _ => cond.operands.first().map(to_json).unwrap_or(Value::Null),
        };
        ConditionDef {
            operator: cond.operator,
            value,
        }
    }
}

fn to_json(cell: &CellValue) -> Value {
    serde_json::to_value(cell).unwrap_or(Value::Null)
}

impl Condition {
    pub fn new(operator: Operator, value: Value) -> Result<Self, ConfigError> {
        Self::try_from(ConditionDef { operator, value })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Missing cells never satisfy a condition.
    pub fn matches(&self, cell: &CellValue) -> bool {
        if cell.is_missing() {
            return false;
        }
        let Some(operand) = self.operands.first() else {
            return false;
        };
        match self.operator {
            Operator::Eq => loosely_equal(cell, operand),
            Operator::Ne => !loosely_equal(cell, operand),
            Operator::Gt => compare(cell, operand) == Some(Ordering::Greater),
            Operator::Ge => matches!(compare(cell, operand), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lt => compare(cell, operand) == Some(Ordering::Less),
            Operator::Le => matches!(compare(cell, operand), Some(Ordering::Less | Ordering::Equal)),
            Operator::In => self.operands.iter().any(|op| loosely_equal(cell, op)),
            Operator::Contains => cell.to_string().contains(&operand.to_string()),
        }
    }

    pub fn describe(&self) -> String {
        let shown: Vec<String> = self.operands.iter().map(|v| v.to_string()).collect();
        match self.operator {
            Operator::In => format!("in [{}]", shown.join(", ")),
            op => format!("{} {}", op.as_str(), shown.join(", ")),
        }
    }
}

/// Equality under the operand's reading: numbers compare numerically,
/// booleans by token, everything else by text.
fn loosely_equal(cell: &CellValue, operand: &CellValue) -> bool {
    match operand {
        CellValue::Number(n) => cell.as_number() == Some(*n),
        CellValue::Boolean(b) => cell.as_boolean() == Some(*b),
        CellValue::DateTime(dt) => cell.as_datetime() == Some(*dt),
        _ => cell.to_string() == operand.to_string(),
    }
}

/// Ordering under the operand's reading. Text operands that parse as dates
/// compare as dates; other text compares lexicographically.
fn compare(cell: &CellValue, operand: &CellValue) -> Option<Ordering> {
    match operand {
        CellValue::Number(n) => cell.as_number().map(|c| c.total_cmp(n)),
        CellValue::DateTime(dt) => cell.as_datetime().map(|c| c.cmp(dt)),
        CellValue::Text(s) => match (cell.as_datetime(), operand.as_datetime()) {
            (Some(c), Some(o)) => Some(c.cmp(&o)),
            _ => Some(cell.to_string().as_str().cmp(s.as_str())),
        },
        CellValue::Boolean(_) | CellValue::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(value: Value) -> Condition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_comparisons() {
        let gt = cond(json!({"operator": ">", "value": 10}));
        assert!(gt.matches(&CellValue::text("11")));
        assert!(!gt.matches(&CellValue::Number(10.0)));
        assert!(!gt.matches(&CellValue::text("abc")));
        assert!(!gt.matches(&CellValue::Null));

        let le = cond(json!({"operator": "<=", "value": 10}));
        assert!(le.matches(&CellValue::Number(10.0)));
    }

    #[test]
    fn test_equality_and_membership() {
        let eq = cond(json!({"operator": "==", "value": "north"}));
        assert!(eq.matches(&CellValue::text("north")));
        assert!(!eq.matches(&CellValue::text("North")));

        let ne = cond(json!({"operator": "!=", "value": 1}));
        assert!(ne.matches(&CellValue::text("2")));
        assert!(!ne.matches(&CellValue::text("1.0")));

        let within = cond(json!({"operator": "in", "value": ["a", "b"]}));
        assert!(within.matches(&CellValue::text("b")));
        assert!(!within.matches(&CellValue::text("c")));
    }

    #[test]
    fn test_contains_and_dates() {
        let contains = cond(json!({"operator": "contains", "value": "@example"}));
        assert!(contains.matches(&CellValue::text("ann@example.com")));

        let after = cond(json!({"operator": ">=", "value": "2024-01-01"}));
        assert!(after.matches(&CellValue::text("15/03/2024")));
        assert!(!after.matches(&CellValue::text("2023-12-31")));
    }

    #[test]
    fn test_invalid_conditions() {
        assert!(serde_json::from_value::<Condition>(json!({"operator": "in", "value": 3})).is_err());
        assert!(serde_json::from_value::<Condition>(json!({"operator": "in", "value": []})).is_err());
        assert!(serde_json::from_value::<Condition>(json!({"operator": ">", "value": [1, 2]})).is_err());
        assert!(serde_json::from_value::<Condition>(json!({"operator": "~=", "value": 1})).is_err());
        assert!(Condition::new(Operator::Eq, Value::Null).is_err());
    }

    #[test]
    fn test_serializes_back() {
        let c = cond(json!({"operator": "in", "value": ["x", 2]}));
        assert_eq!(serde_json::to_value(&c).unwrap(), json!({"operator": "in", "value": ["x", 2.0]}));
        assert_eq!(c.describe(), "in [x, 2]");
    }
}
