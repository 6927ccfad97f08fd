//! Semantic type inference for a single column.

use crate::models::{CellValue, SemanticType};

/// Infer the semantic type of a column.
///
/// Precedence over non-missing values: numeric, datetime, boolean, then
/// categorical when `distinct / row_count` is below `cardinality_threshold`,
/// else text. An all-missing column is text. Never fails.
pub fn infer_type(values: &[CellValue], distinct_count: usize, cardinality_threshold: f64) -> SemanticType {
    let mut present = values.iter().filter(|v| !v.is_missing()).peekable();
    if present.peek().is_none() {
        return SemanticType::Text;
    }

    let present: Vec<&CellValue> = present.collect();

    if present.iter().all(|v| v.as_number().is_some()) {
        return SemanticType::Numeric;
    }
    if present.iter().all(|v| v.as_datetime().is_some()) {
        return SemanticType::Datetime;
    }
    if present.iter().all(|v| v.as_boolean().is_some()) {
        return SemanticType::Boolean;
    }

    let ratio = distinct_count as f64 / values.len() as f64;
    if ratio < cardinality_threshold {
        SemanticType::Categorical
    } else {
        SemanticType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<CellValue> {
        items.iter().map(|s| CellValue::text(*s)).collect()
    }

    #[test]
    fn test_numeric_wins_over_boolean() {
        let values = texts(&["1", "0", "1"]);
        assert_eq!(infer_type(&values, 2, 0.5), SemanticType::Numeric);
    }

    #[test]
    fn test_nulls_ignored() {
        let mut values = texts(&["2024-01-01", "2024-02-01"]);
        values.push(CellValue::Null);
        values.push(CellValue::text(" "));
        assert_eq!(infer_type(&values, 2, 0.5), SemanticType::Datetime);
    }

    #[test]
    fn test_boolean_tokens() {
        let values = texts(&["yes", "No", "TRUE"]);
        assert_eq!(infer_type(&values, 3, 0.5), SemanticType::Boolean);
    }

    #[test]
    fn test_categorical_vs_text() {
        let values = texts(&["red", "blue", "red", "red", "blue", "red"]);
        assert_eq!(infer_type(&values, 2, 0.5), SemanticType::Categorical);

        let values = texts(&["alpha", "beta", "gamma"]);
        assert_eq!(infer_type(&values, 3, 0.5), SemanticType::Text);
    }

    #[test]
    fn test_all_null_is_text() {
        let values = vec![CellValue::Null, CellValue::Null];
        assert_eq!(infer_type(&values, 0, 0.5), SemanticType::Text);
        assert_eq!(infer_type(&[], 0, 0.5), SemanticType::Text);
    }

    #[test]
    fn test_numeric_looking_garbage_falls_back() {
        let values = texts(&["12", "13x", "14"]);
        assert_eq!(infer_type(&values, 3, 0.5), SemanticType::Text);
    }
}
