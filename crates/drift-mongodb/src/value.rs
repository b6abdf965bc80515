//! BSON to drift value conversion

use base64::{engine::general_purpose, Engine as _};
use bson::{Bson, Document};
use drift_core::{Row, Value};
use std::collections::BTreeMap;

/// Convert a BSON value.
///
/// Identifiers and decimals become strings (`ObjectId` as hex, `Decimal128`
/// in its exact decimal text), dates become timestamps, binary data becomes
/// base64 text. Types with no natural counterpart keep their extended JSON
/// shape as a document.
pub fn convert_bson(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        // NaN and infinities have no JSON number
        Bson::Double(f) => Value::from_f64(f).unwrap_or_else(|| Value::String(f.to_string())),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::Timestamp(dt.to_chrono()),
        Bson::Timestamp(ts) => {
            // The increment orders events within one second
            match chrono::DateTime::from_timestamp(ts.time as i64, ts.increment) {
                Some(datetime) => Value::Timestamp(datetime),
                None => tagged("$timestamp", Value::from(ts.time as i64)),
            }
        }
        Bson::Binary(binary) => Value::String(general_purpose::STANDARD.encode(binary.bytes)),
        Bson::RegularExpression(regex) => {
            Value::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::JavaScriptCodeWithScope(code) => {
            let mut doc = BTreeMap::new();
            doc.insert("$code".to_string(), Value::String(code.code));
            doc.insert("$scope".to_string(), Value::Document(convert_document(code.scope)));
            Value::Document(doc)
        }
        Bson::Array(items) => Value::Array(items.into_iter().map(convert_bson).collect()),
        Bson::Document(doc) => Value::Document(convert_document(doc)),
        Bson::MaxKey => tagged("$maxKey", Value::from(1)),
        Bson::MinKey => tagged("$minKey", Value::from(1)),
        // DbPointer fields are private in the driver
        Bson::DbPointer(_) => Value::String("$dbPointer".to_string()),
    }
}

/// Convert a whole document into a row.
pub fn convert_document(doc: Document) -> Row {
    doc.into_iter()
        .map(|(key, value)| (key, convert_bson(value)))
        .collect()
}

fn tagged(tag: &str, value: Value) -> Value {
    let mut doc = BTreeMap::new();
    doc.insert(tag.to_string(), value);
    Value::Document(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_scalars() {
        assert_eq!(convert_bson(Bson::Int32(7)), Value::from(7));
        assert_eq!(convert_bson(Bson::Int64(7)), Value::from(7));
        assert_eq!(convert_bson(Bson::Double(7.0)), Value::from(7));
        assert_eq!(convert_bson(Bson::Double(f64::NAN)), Value::from("NaN"));
        assert_eq!(convert_bson(Bson::Undefined), Value::Null);
        assert_eq!(convert_bson(Bson::Boolean(true)), Value::Bool(true));
    }

    #[test]
    fn test_object_id_is_hex() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(
            convert_bson(Bson::ObjectId(oid)),
            Value::from("507f1f77bcf86cd799439011")
        );
    }

    #[test]
    fn test_datetime_is_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let value = convert_bson(Bson::DateTime(bson::DateTime::from_chrono(ts)));
        assert_eq!(value, Value::Timestamp(ts));
        assert_eq!(value, Value::from("2024-05-01T12:30:00Z"));
    }

    #[test]
    fn test_decimal_keeps_exact_text() {
        let d: bson::Decimal128 = "12.50".parse().unwrap();
        assert_eq!(convert_bson(Bson::Decimal128(d)), Value::from("12.50"));
    }

    #[test]
    fn test_binary_is_base64() {
        let bin = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1, 2, 3],
        };
        assert_eq!(convert_bson(Bson::Binary(bin)), Value::from("AQID"));
    }

    #[test]
    fn test_nested_document() {
        let row = convert_document(doc! {
            "_id": 1,
            "profile": { "tags": ["a", "b"], "age": 30 },
        });
        let expected: Row = serde_json::from_value(serde_json::json!({
            "_id": 1,
            "profile": { "tags": ["a", "b"], "age": 30 },
        }))
        .unwrap();
        assert_eq!(row, expected);
    }
}
