//! Cell values and the parsing rules shared by the profiler, the validators
//! and the coercion stage.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Date-only layouts recognised during inference, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d.%m.%Y"];

/// Date-time layouts recognised during inference, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1"];
const FALSE_TOKENS: &[&str] = &["false", "no", "n", "0"];

/// A single cell of a [`super::Table`].
///
/// Tables loaded from CSV start out as `Text` and `Null` cells; the other
/// variants appear once `coerce_type`, `impute_missing` or `cap_outliers`
/// have written native values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Null, or text that is empty once trimmed.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric reading of the cell: native numbers, or text holding a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Date-time reading of the cell: native datetimes, or text in a recognised layout.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(dt) => Some(*dt),
            CellValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Boolean reading of the cell: native booleans, or a recognised token.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(b) => Some(*b),
            CellValue::Text(s) => parse_boolean(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Number(_) => "number",
            CellValue::Boolean(_) => "boolean",
            CellValue::DateTime(_) => "datetime",
            CellValue::Text(_) => "text",
        }
    }

    /// Convert a JSON literal (spec parameters, API payloads) into a cell.
    ///
    /// Strings stay text; no implicit parsing happens here.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(*b),
            Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    /// Normalised bit pattern used for equality and hashing of numbers.
    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0.0f64.to_bits()
        } else if n.is_nan() {
            f64::NAN.to_bits()
        } else {
            n.to_bits()
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Boolean(_) => 1,
            CellValue::Number(_) => 2,
            CellValue::DateTime(_) => 3,
            CellValue::Text(_) => 4,
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        CellValue::from_json(&value)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Number(a), CellValue::Number(b)) => {
                Self::number_bits(*a) == Self::number_bits(*b)
            }
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a == b,
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a == b,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            CellValue::Null => {}
            CellValue::Number(n) => Self::number_bits(*n).hash(state),
            CellValue::Boolean(b) => b.hash(state),
            CellValue::DateTime(dt) => dt.hash(state),
            CellValue::Text(s) => s.hash(state),
        }
    }
}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    /// Total order: variants rank first, then values (numbers via `total_cmp`).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Parse trimmed text as a finite number ("NaN" and "inf" are rejected).
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse trimmed text with the recognised date and date-time layouts.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse text with an explicit chrono layout; date-only layouts yield midnight.
pub fn parse_datetime_with(s: &str, format: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    NaiveDateTime::parse_from_str(trimmed, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, format)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Case-insensitive boolean tokens: true/false, yes/no, y/n, 1/0.
pub fn parse_boolean(s: &str) -> Option<bool> {
    let lower = s.trim().to_lowercase();
    if TRUE_TOKENS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Integers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_detection() {
        assert!(CellValue::Null.is_missing());
        assert!(CellValue::text("   ").is_missing());
        assert!(!CellValue::text("0").is_missing());
        assert!(!CellValue::Number(0.0).is_missing());
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("-1.5e2"), Some(-150.0));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("12abc"), None);
    }

    #[test]
    fn test_parse_datetime_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-15"), Some(expected));
        assert_eq!(parse_datetime("15/03/2024"), Some(expected));
        assert_eq!(parse_datetime("15.03.2024"), Some(expected));
        assert!(parse_datetime("2024-03-15T10:30:00Z").is_some());
        assert!(parse_datetime("2024-03-15 10:30:00").is_some());
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_parse_boolean_tokens() {
        assert_eq!(parse_boolean("Yes"), Some(true));
        assert_eq!(parse_boolean(" FALSE "), Some(false));
        assert_eq!(parse_boolean("0"), Some(false));
        assert_eq!(parse_boolean("maybe"), None);
    }

    #[test]
    fn test_number_equality_and_display() {
        assert_eq!(CellValue::Number(0.0), CellValue::Number(-0.0));
        assert_ne!(CellValue::Number(1.0), CellValue::text("1"));
        assert_eq!(CellValue::Number(25.0).to_string(), "25");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_json_round_trip_shape() {
        let cells: Vec<CellValue> = serde_json::from_value(json!([null, 3, true, "x"])).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Null,
                CellValue::Number(3.0),
                CellValue::Boolean(true),
                CellValue::text("x")
            ]
        );
        assert_eq!(serde_json::to_value(&cells).unwrap(), json!([null, 3.0, true, "x"]));
    }
}
