//! Row values.
//!
//! Every source adapter normalizes its native values into [`Value`] before a
//! row reaches a [`Snapshot`](crate::Snapshot) or a [`Delta`](crate::Delta).
//! The engine never looks inside a value beyond structural comparison and
//! canonical encoding, so the set of variants is deliberately small.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A captured row: column name to value, kept in sorted column order.
pub type Row = BTreeMap<String, Value>;

/// Engine-agnostic value of a single column.
///
/// Equality is structural rather than representational:
///
/// - numbers compare by their canonical text, so `1` equals `1.0`
/// - a [`Value::Timestamp`] equals a [`Value::String`] holding the same
///   canonical UTC RFC3339 text, which keeps a snapshot reloaded from JSON
///   diffable against a freshly captured one
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Always stored in UTC.
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Document(BTreeMap<String, Value>),
}

impl Value {
    /// Build a number from a float. Returns `None` for NaN and infinities,
    /// which have no JSON representation.
    pub fn from_f64(f: f64) -> Option<Self> {
        serde_json::Number::from_f64(f).map(Value::Number)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used when an adapter has to infer a
    /// declared type from the data itself.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }

    /// Text form shared by strings and timestamps for comparison purposes.
    pub(crate) fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Timestamp(ts) => Some(Cow::Owned(canonical_timestamp(ts))),
            _ => None,
        }
    }

    /// Convert into a plain JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => serde_json::Value::String(canonical_timestamp(ts)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Document(doc) => serde_json::Value::Object(
                doc.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => canonical_number(a) == canonical_number(b),
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (a, b) => match (a.text(), b.text()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => serializer.serialize_str(&canonical_timestamp(ts)),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Document(doc) => serializer.collect_map(doc),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Document(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(i.into())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Number(i.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// Canonical text of a number.
///
/// Works on the decimal text rather than a float, so values wider than `f64`
/// compare exactly. Equal numbers share one spelling: `1`, `1.0` and `1e0`
/// all become `1`, and `0.50` becomes `0.5`. Very large or very small
/// magnitudes are written in exponent form (`1e21`, `1.5e-25`).
pub fn canonical_number(n: &serde_json::Number) -> String {
    let text = n.to_string();
    canonical_decimal(&text).unwrap_or(text)
}

fn canonical_decimal(text: &str) -> Option<String> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], unsigned[pos + 1..].parse::<i64>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    let significant = digits.trim_end_matches('0');
    if significant.is_empty() {
        return Some("0".to_string());
    }
    // value = significant * 10^scale
    let scale = exponent
        .checked_sub(i64::try_from(frac_part.len()).ok()?)?
        .checked_add(i64::try_from(digits.len() - significant.len()).ok()?)?;
    let len = i64::try_from(significant.len()).ok()?;
    let point = len.checked_add(scale)?;

    let body = if (0..=20).contains(&scale) {
        format!("{significant}{}", "0".repeat(scale as usize))
    } else if scale < 0 && point > 0 {
        let (whole, fraction) = significant.split_at(point as usize);
        format!("{whole}.{fraction}")
    } else if scale < 0 && point > -20 {
        format!("0.{}{significant}", "0".repeat(point.unsigned_abs() as usize))
    } else {
        let (first, rest) = significant.split_at(1);
        let dot = if rest.is_empty() { "" } else { "." };
        format!("{first}{dot}{rest}e{}", point - 1)
    };
    Some(if negative { format!("-{body}") } else { body })
}

/// Canonical RFC3339 text of a timestamp, always in UTC with a `Z` suffix.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse the timestamp spellings databases commonly emit into UTC.
///
/// Accepts RFC3339 (`2024-01-01T10:00:00+02:00`), PostgreSQL text output with
/// short offsets (`2024-01-01 10:00:00+02`), and zone-less forms which are
/// taken as UTC (`2024-01-01 10:00:00.123456`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    let normalized = s.replacen(' ', "T", 1);
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }
    // "+02" style offsets
    if let Some(pos) = normalized.rfind(['+', '-']) {
        let offset = &normalized[pos..];
        if pos > 10 && offset.len() == 3 {
            let padded = format!("{normalized}:00");
            if let Ok(ts) = DateTime::parse_from_rfc3339(&padded) {
                return Some(ts.with_timezone(&Utc));
            }
        }
    }

    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integral_float_equals_integer() {
        let int: Value = serde_json::json!(1).into();
        let float: Value = serde_json::json!(1.0).into();
        assert_eq!(int, float);
        assert_ne!(int, Value::from(2));
    }

    #[test]
    fn wide_numbers_compare_exactly() {
        let parse = |text: &str| -> Value { serde_json::from_str(text).unwrap() };
        assert_ne!(
            parse("12345678901234567890123"),
            parse("12345678901234567890124")
        );
        assert_ne!(
            parse("0.12345678901234567891"),
            parse("0.12345678901234567899")
        );
        assert_eq!(parse("0.50"), parse("0.5"));
        assert_eq!(parse("1e2"), parse("100"));
        assert_eq!(parse("-0.0"), parse("0"));
    }

    #[test]
    fn canonical_number_spellings() {
        let canon = |text: &str| {
            let n: serde_json::Number = serde_json::from_str(text).unwrap();
            canonical_number(&n)
        };
        assert_eq!(canon("10.0"), "10");
        assert_eq!(canon("-2.50"), "-2.5");
        assert_eq!(canon("0.001"), "0.001");
        assert_eq!(canon("1.5E-25"), "1.5e-25");
        assert_eq!(canon("1e21"), "1e21");
        assert_eq!(canon("1000000000000000000000"), "1e21");
        assert_eq!(canon("123.456e1"), "1234.56");
    }

    #[test]
    fn wide_numbers_keep_their_text() {
        let text = r#"{"n":0.12345678901234567891}"#;
        let row: Row = serde_json::from_str(text).unwrap();
        assert_eq!(serde_json::to_string(&row).unwrap(), text);
    }

    #[test]
    fn timestamp_equals_its_canonical_string() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(Value::Timestamp(ts), Value::from("2024-03-01T12:30:00Z"));
        assert_ne!(Value::Timestamp(ts), Value::from("2024-03-01 12:30:00"));
    }

    #[test]
    fn timestamp_serializes_as_utc_text() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_string(&Value::Timestamp(ts)).unwrap();
        assert_eq!(json, "\"2024-03-01T12:30:00Z\"");
    }

    #[test]
    fn null_is_not_a_string() {
        assert_ne!(Value::Null, Value::from("null"));
        assert_ne!(Value::Bool(false), Value::from(0));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(Value::from_f64(f64::NAN).is_none());
        assert!(Value::from_f64(f64::INFINITY).is_none());
        assert!(Value::from_f64(2.5).is_some());
    }

    #[test]
    fn parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 10:00:00+02"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:00:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("not a timestamp"), None);
    }

    #[test]
    fn nested_documents_compare_structurally() {
        let a: Value = serde_json::json!({"b": 1, "a": [1, 2.0]}).into();
        let b: Value = serde_json::json!({"a": [1.0, 2], "b": 1.0}).into();
        assert_eq!(a, b);
    }
}
