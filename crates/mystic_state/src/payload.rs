//! Conversion of arbitrary values into snapshot payloads.
//!
//! Anything that serializes to JSON is stored as-is. Values that fail to
//! serialize degrade to their `Debug` text instead of failing the capture.
//! Structs can also be stored as `{"__class__": ..., "__dict__": ...}`
//! records so the payload keeps the type name.
//!
//! Only the top-level value becomes a record. The type name comes from the
//! static type at the call site, and serde exposes no type names for
//! nested fields, so nested structs are stored as plain maps.

use mystic_core::Value;
use serde::Serialize;
use serde_json::Map;
use std::fmt::Debug;

/// Key holding the type name in an object record
pub const CLASS_KEY: &str = "__class__";

/// Key holding the fields in an object record
pub const FIELDS_KEY: &str = "__dict__";

/// Convert to a JSON value, falling back to `Debug` text
#[must_use]
pub fn to_payload<T: Serialize + Debug + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(err) => {
            tracing::debug!(%err, "payload not serializable, storing debug text");
            Value::String(format!("{:?}", value))
        }
    }
}

/// Convert to an object record when the value serializes to a map.
///
/// Nested structs inside the fields stay plain maps.
#[must_use]
pub fn object_record<T: Serialize + Debug>(value: &T) -> Value {
    match to_payload(value) {
        Value::Object(fields) => {
            let mut record = Map::new();
            record.insert(
                CLASS_KEY.to_string(),
                Value::String(std::any::type_name::<T>().to_string()),
            );
            record.insert(FIELDS_KEY.to_string(), Value::Object(fields));
            Value::Object(record)
        }
        other => other,
    }
}

/// Whether a value is an object record
#[must_use]
pub fn is_object_record(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.len() == 2 && map.get(CLASS_KEY).is_some_and(Value::is_string) && map.contains_key(FIELDS_KEY)
    })
}

/// Wrap a single value under `key`
#[must_use]
pub fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Serialize)]
    struct Account {
        owner: String,
        balance: i64,
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(to_payload(&42), json!(42));
        assert_eq!(to_payload(&vec!["a", "b"]), json!(["a", "b"]));
        assert_eq!(to_payload("text"), json!("text"));
    }

    #[test]
    fn test_unserializable_falls_back_to_debug() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        let payload = to_payload(&map);
        assert_eq!(payload, json!(r#"{(1, 2): "pair"}"#));
    }

    #[test]
    fn test_object_record() {
        let account = Account {
            owner: "ada".to_string(),
            balance: 10,
        };
        let record = object_record(&account);
        assert!(is_object_record(&record));
        assert!(record[CLASS_KEY].as_str().unwrap().ends_with("Account"));
        assert_eq!(record[FIELDS_KEY], json!({"owner": "ada", "balance": 10}));
    }

    #[test]
    fn test_object_record_of_scalar_is_plain() {
        assert_eq!(object_record(&7), json!(7));
        assert!(!is_object_record(&json!({"a": 1})));
    }

    #[test]
    fn test_nested_structs_stay_plain_maps() {
        #[derive(Debug, Serialize)]
        struct Ledger {
            primary: Account,
        }

        let ledger = Ledger {
            primary: Account {
                owner: "ada".to_string(),
                balance: 10,
            },
        };
        let record = object_record(&ledger);
        assert!(is_object_record(&record));
        let nested = &record[FIELDS_KEY]["primary"];
        assert!(!is_object_record(nested));
        assert_eq!(nested, &json!({"owner": "ada", "balance": 10}));
    }
}
