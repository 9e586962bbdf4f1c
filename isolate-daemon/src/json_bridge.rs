//! Converts between the wire's `MarshalledValue` (spec.md §4.2) and
//! `serde_json::Value`, the shape `isolate-engine::invoke` passes to and
//! from a guest function call. This is a plain data-shape translation, not
//! a second marshaller -- the guest-value <-> wire-value discriminator
//! logic already lives in `isolate-bridge::marshal` and is not duplicated
//! here.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use isolate_protocol::MarshalledValue;
use serde_json::{Map, Number, Value};

#[must_use]
pub fn to_json(value: &MarshalledValue) -> Value {
    match value {
        MarshalledValue::Null | MarshalledValue::Undefined => Value::Null,
        MarshalledValue::Bool(b) => Value::Bool(*b),
        MarshalledValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        MarshalledValue::BigInt(s) => Value::String(s.clone()),
        MarshalledValue::String(s) => Value::String(s.clone()),
        MarshalledValue::Bytes { bytes, offset, length } => {
            let slice = &bytes[*offset..*offset + *length];
            Value::String(BASE64.encode(slice))
        }
        MarshalledValue::ClassRef { instance_id, class_name } => {
            let mut map = Map::new();
            map.insert("instanceId".to_owned(), Value::Number((*instance_id).into()));
            map.insert("className".to_owned(), Value::String(class_name.class_name().to_owned()));
            Value::Object(map)
        }
        MarshalledValue::BackRef(id) => {
            let mut map = Map::new();
            map.insert("backRef".to_owned(), Value::Number((*id).into()));
            Value::Object(map)
        }
        MarshalledValue::Sequence(items) => Value::Array(items.iter().map(to_json).collect()),
        MarshalledValue::Record(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), to_json(value));
            }
            Value::Object(map)
        }
    }
}

#[must_use]
pub fn from_json(value: &Value) -> MarshalledValue {
    match value {
        Value::Null => MarshalledValue::Null,
        Value::Bool(b) => MarshalledValue::Bool(*b),
        Value::Number(n) => MarshalledValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => MarshalledValue::String(s.clone()),
        Value::Array(items) => MarshalledValue::Sequence(items.iter().map(from_json).collect()),
        Value::Object(fields) => {
            let mut record = BTreeMap::new();
            for (key, value) in fields {
                record.insert(key.clone(), from_json(value));
            }
            MarshalledValue::record(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_plain_record() {
        let mut fields = BTreeMap::new();
        fields.insert("message".to_owned(), MarshalledValue::String("hi".to_owned()));
        fields.insert("timestamp".to_owned(), MarshalledValue::Number(42.0));
        let value = MarshalledValue::record(fields);

        let json = to_json(&value);
        assert_eq!(json["message"], "hi");
        assert_eq!(json["timestamp"], 42.0);

        let back = from_json(&json);
        assert_eq!(back, value);
    }

    #[test]
    fn bytes_become_base64_strings() {
        let value = MarshalledValue::bytes(vec![1, 2, 3]);
        let json = to_json(&value);
        assert_eq!(json, Value::String(BASE64.encode([1, 2, 3])));
    }
}
