//! Rule-based validation of table cells.
//!
//! Rules never alter the table and never fail: each one yields zero or more
//! [`Violation`]s, ordered by rule position then row index.
//!
//! # Rule kinds
//!
//! | Kind         | Parameters          | Flags                                         |
//! |--------------|---------------------|-----------------------------------------------|
//! | `range`      | `min?`, `max?`      | numbers outside the inclusive bounds          |
//! | `pattern`    | `regex`             | cells whose full text does not match          |
//! | `uniqueness` | -                   | repeats of a value seen in an earlier row     |
//! | `not_null`   | -                   | missing cells                                 |
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use excel_cleaner::validation::{validate, ValidationRule};
//!
//! let rule: ValidationRule = serde_json::from_value(json!({
//!     "column": "score", "rule_kind": "range", "min": 0, "max": 100
//! }))?;
//! let violations = validate(&table, &[rule], &profiles);
//! ```

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{ConfigError, ConfigResult};
use crate::models::{format_number, CellValue, SemanticType, Table, Violation, ViolationKind};
use crate::profile::TableProfile;

/// Wire shape of a rule, as written in a pipeline spec document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule_kind", rename_all = "snake_case")]
pub enum RuleDef {
    Range {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Pattern {
        column: String,
        regex: String,
    },
    Uniqueness {
        column: String,
    },
    NotNull {
        column: String,
    },
}

/// A checked validation rule bound to one column.
///
/// Construction (directly or through serde) rejects a range with no bound or
/// with `min > max`, and a pattern that does not compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RuleDef", into = "RuleDef")]
pub struct ValidationRule {
    column: String,
    check: Check,
}

#[derive(Debug, Clone)]
enum Check {
    Range { min: Option<f64>, max: Option<f64> },
    Pattern { source: String, regex: Regex },
    Uniqueness,
    NotNull,
}

impl ValidationRule {
    pub fn range(column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> ConfigResult<Self> {
        if min.is_none() && max.is_none() {
            return Err(ConfigError::missing("range", "min or max"));
        }
        for (name, bound) in [("min", min), ("max", max)] {
            if bound.is_some_and(|b| !b.is_finite()) {
                return Err(ConfigError::invalid("range", name, "must be a finite number"));
            }
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(ConfigError::invalid(
                    "range",
                    "min",
                    format!("{} is greater than max {}", format_number(lo), format_number(hi)),
                ));
            }
        }
        Ok(Self {
            column: column.into(),
            check: Check::Range { min, max },
        })
    }

    /// The pattern must match a cell's whole text, not a substring.
    pub fn pattern(column: impl Into<String>, pattern: &str) -> ConfigResult<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            column: column.into(),
            check: Check::Pattern {
                source: pattern.to_string(),
                regex,
            },
        })
    }

    pub fn uniqueness(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            check: Check::Uniqueness,
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            check: Check::NotNull,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn kind(&self) -> ViolationKind {
        match self.check {
            Check::Range { .. } => ViolationKind::Range,
            Check::Pattern { .. } => ViolationKind::Pattern,
            Check::Uniqueness => ViolationKind::Uniqueness,
            Check::NotNull => ViolationKind::NotNull,
        }
    }
}

impl TryFrom<RuleDef> for ValidationRule {
    type Error = ConfigError;

    fn try_from(def: RuleDef) -> Result<Self, Self::Error> {
        match def {
            RuleDef::Range { column, min, max } => Self::range(column, min, max),
            RuleDef::Pattern { column, regex } => Self::pattern(column, &regex),
            RuleDef::Uniqueness { column } => Ok(Self::uniqueness(column)),
            RuleDef::NotNull { column } => Ok(Self::not_null(column)),
        }
    }
}

impl From<ValidationRule> for RuleDef {
    fn from(rule: ValidationRule) -> Self {
        let column = rule.column;
        match rule.check {
            Check::Range { min, max } => RuleDef::Range { column, min, max },
            Check::Pattern { source, .. } => RuleDef::Pattern { column, regex: source },
            Check::Uniqueness => RuleDef::Uniqueness { column },
            Check::NotNull => RuleDef::NotNull { column },
        }
    }
}

/// Apply every rule to `table`.
///
/// `profiles` supplies the inferred column types: a non-numeric cell checked
/// by a range rule is reported as a type mismatch when its column is
/// profiled numeric, and ignored otherwise. Rules on unknown columns are
/// skipped with a warning.
pub fn validate(table: &Table, rules: &[ValidationRule], profiles: &TableProfile) -> Vec<Violation> {
    log_info(format!("Validating {} rule(s)...", rules.len()));

    let mut violations = Vec::new();
    for (rule_index, rule) in rules.iter().enumerate() {
        let Some(column) = table.column(&rule.column) else {
            log_warning(format!(
                "Rule #{} ({}): column '{}' not found, skipped",
                rule_index,
                rule.kind().as_str(),
                rule.column
            ));
            continue;
        };

        let declared_numeric = match profiles.get(&rule.column) {
            Some(profile) => profile.inferred_type == SemanticType::Numeric,
            None => column.declared_type() == Some(SemanticType::Numeric),
        };

        let before = violations.len();
        let mut flag = |row_index: usize, kind: ViolationKind, message: String| {
            violations.push(Violation {
                row_index,
                column: rule.column.clone(),
                rule_index,
                kind,
                message,
            });
        };

        match &rule.check {
            Check::NotNull => {
                for (row, cell) in column.values().iter().enumerate() {
                    if cell.is_missing() {
                        flag(row, ViolationKind::NotNull, "value is missing".to_string());
                    }
                }
            }
            Check::Range { min, max } => {
                for (row, cell) in column.values().iter().enumerate() {
                    if cell.is_missing() {
                        continue;
                    }
                    match cell.as_number() {
                        Some(n) => {
                            let below = min.is_some_and(|lo| n < lo);
                            let above = max.is_some_and(|hi| n > hi);
                            if below || above {
                                flag(
                                    row,
                                    ViolationKind::Range,
                                    format!("{} is outside {}", format_number(n), describe_bounds(*min, *max)),
                                );
                            }
                        }
                        None if declared_numeric => flag(
                            row,
                            ViolationKind::TypeMismatch,
                            format!("'{}' is not a number", cell),
                        ),
                        None => {}
                    }
                }
            }
            Check::Pattern { source, regex } => {
                for (row, cell) in column.values().iter().enumerate() {
                    if cell.is_missing() {
                        continue;
                    }
                    let text = cell.to_string();
                    if !regex.is_match(&text) {
                        flag(
                            row,
                            ViolationKind::Pattern,
                            format!("'{}' does not match /{}/", text, source),
                        );
                    }
                }
            }
            Check::Uniqueness => {
                let mut seen: HashSet<&CellValue> = HashSet::new();
                for (row, cell) in column.values().iter().enumerate() {
                    if cell.is_missing() {
                        continue;
                    }
                    if !seen.insert(cell) {
                        flag(row, ViolationKind::Uniqueness, format!("duplicate value '{}'", cell));
                    }
                }
            }
        }

        let found = violations.len() - before;
        if found > 0 {
            log_warning(format!(
                "Rule #{} ({} on '{}'): {} violation(s)",
                rule_index,
                rule.kind().as_str(),
                rule.column,
                found
            ));
        }
    }

    if violations.is_empty() {
        log_success("All rules passed");
    }
    violations
}

fn describe_bounds(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", format_number(lo), format_number(hi)),
        (Some(lo), None) => format!("[{}, +inf)", format_number(lo)),
        (None, Some(hi)) => format!("(-inf, {}]", format_number(hi)),
        (None, None) => "(-inf, +inf)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{profile_table, ProfilerOptions};
    use serde_json::json;

    fn table(columns: &[(&str, Vec<CellValue>)]) -> Table {
        let cols = columns
            .iter()
            .map(|(name, values)| crate::models::Column::new(*name, values.clone()))
            .collect();
        Table::new(cols).unwrap()
    }

    fn run(table: &Table, rules: &[ValidationRule]) -> Vec<Violation> {
        let profiles = profile_table(table, &ProfilerOptions::default());
        validate(table, rules, &profiles)
    }

    #[test]
    fn test_range_flags_single_row() {
        let t = table(&[(
            "score",
            vec![10.0.into(), 55.0.into(), 100.0.into(), (-5.0).into(), 0.0.into()],
        )]);
        let rule: ValidationRule =
            serde_json::from_value(json!({"column": "score", "rule_kind": "range", "min": 0, "max": 100})).unwrap();

        let violations = run(&t, &[rule]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].row_index, 3);
        assert_eq!(violations[0].column, "score");
        assert_eq!(violations[0].kind, ViolationKind::Range);
        assert!(violations[0].message.contains("-5"));
    }

    #[test]
    fn test_range_type_mismatch_only_on_numeric_columns() {
        let t = table(&[("n", vec!["1".into(), "abc".into(), "3".into()])]);
        let rule = ValidationRule::range("n", Some(0.0), None).unwrap();

        // profiled as text: non-numeric cells are skipped
        assert!(run(&t, &[rule.clone()]).is_empty());

        // a column declared numeric profiles as numeric, stray text is flagged
        let declared = t.columns()[0].clone().with_declared_type(SemanticType::Numeric);
        let t = Table::new(vec![declared]).unwrap();
        let violations = run(&t, &[rule.clone()]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::TypeMismatch);
        assert_eq!(violations[0].row_index, 1);

        // without profiles the declared type alone decides
        assert_eq!(validate(&t, &[rule], &Default::default()).len(), 1);
    }

    #[test]
    fn test_pattern_is_full_match() {
        let t = table(&[("code", vec!["AB12".into(), "xAB12".into(), CellValue::Null, "AB1".into()])]);
        let rule = ValidationRule::pattern("code", r"[A-Z]{2}\d{2}").unwrap();

        let rows: Vec<usize> = run(&t, &[rule]).iter().map(|v| v.row_index).collect();
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn test_uniqueness_ignores_missing_and_keeps_first() {
        let t = table(&[(
            "id",
            vec!["a".into(), CellValue::Null, "b".into(), "a".into(), CellValue::Null, "a".into()],
        )]);
        let rows: Vec<usize> = run(&t, &[ValidationRule::uniqueness("id")])
            .iter()
            .map(|v| v.row_index)
            .collect();
        assert_eq!(rows, vec![3, 5]);
    }

    #[test]
    fn test_not_null_and_ordering() {
        let t = table(&[
            ("a", vec![CellValue::Null, "x".into(), "  ".into()]),
            ("b", vec!["1".into(), CellValue::Null, "2".into()]),
        ]);
        let rules = vec![ValidationRule::not_null("b"), ValidationRule::not_null("a")];
        let found: Vec<(usize, usize)> = run(&t, &rules).iter().map(|v| (v.rule_index, v.row_index)).collect();
        assert_eq!(found, vec![(0, 1), (1, 0), (1, 2)]);
    }

    #[test]
    fn test_unknown_column_skipped() {
        let t = table(&[("a", vec!["x".into()])]);
        let rules = vec![ValidationRule::not_null("missing"), ValidationRule::not_null("a")];
        assert!(run(&t, &rules).is_empty());
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(matches!(
            ValidationRule::range("x", None, None),
            Err(ConfigError::MissingParameter { .. })
        ));
        assert!(matches!(
            ValidationRule::range("x", Some(5.0), Some(1.0)),
            Err(ConfigError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ValidationRule::pattern("x", "(unclosed"),
            Err(ConfigError::InvalidPattern { .. })
        ));

        let err = serde_json::from_value::<ValidationRule>(json!({"column": "x", "rule_kind": "range"}));
        assert!(err.is_err());
        let err = serde_json::from_value::<ValidationRule>(json!({"column": "x", "rule_kind": "between"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_rule_serializes_back_to_wire_shape() {
        let rule = ValidationRule::pattern("email", r"[^@]+@[^@]+").unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json, json!({"rule_kind": "pattern", "column": "email", "regex": "[^@]+@[^@]+"}));
    }

    #[test]
    fn test_validation_does_not_touch_table() {
        let t = table(&[("a", vec![CellValue::Null, "x".into()])]);
        let before = t.clone();
        let _ = run(&t, &[ValidationRule::not_null("a")]);
        assert_eq!(t, before);
    }
}
