use crate::{
    codec::{ColumnType, FieldCodec, StorageValue},
    model::field::FieldType,
    value::Value,
};
use entrydb_primitives::FieldKind;

fn decode_json_text(s: &str) -> Result<Value, String> {
    let json: serde_json::Value = serde_json::from_str(s).map_err(|e| format!("json decode: {e}"))?;

    Ok(Value::from_json(json))
}

///
/// JsonCodec
///
/// Arbitrary structured documents, stored as one JSON-encoded text column.
///

pub(crate) struct JsonCodec;

impl FieldCodec for JsonCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Json
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        // any value shape is a valid document
        Ok(raw)
    }

    fn validate(&self, _value: &Value, _field: &FieldType) -> Result<(), String> {
        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            other => Ok(StorageValue::Text(other.to_json().to_string())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Text(s) => decode_json_text(&s),
            other => Err(format!("unexpected json storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Text
    }
}

///
/// ListCodec
///
/// An ordered list of scalar values, stored as one JSON-encoded text column.
///

pub(crate) struct ListCodec;

impl FieldCodec for ListCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::List
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::List(_) => Ok(raw),
            // single values are accepted and wrapped
            other @ (Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_)) => {
                Ok(Value::List(vec![other]))
            }
            other => Err(format!("expected a list, got {}", other.type_label())),
        }
    }

    fn validate(&self, value: &Value, _field: &FieldType) -> Result<(), String> {
        match value {
            Value::List(_) => Ok(()),
            other => Err(format!("expected a list, got {}", other.type_label())),
        }
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::List(_) => Ok(StorageValue::Text(value.to_json().to_string())),
            other => Err(format!("expected a list, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Text(s) => decode_json_text(&s),
            other => Err(format!("unexpected list storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Text
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_documents() {
        let f = FieldType::new("meta", FieldKind::Json);
        let doc = Value::from_json(serde_json::json!({"depth": 3, "tags": ["a", "b"]}));

        let stored = JsonCodec.to_storage(&doc, &f).unwrap();
        let back = JsonCodec.from_storage(stored, &f).unwrap();

        assert_eq!(back, doc);
    }

    #[test]
    fn list_wraps_single_scalars() {
        let f = FieldType::new("aliases", FieldKind::List);
        let normalized = ListCodec.normalize(Value::Int(5), &f).unwrap();

        assert_eq!(normalized, Value::List(vec![Value::Int(5)]));
    }

    #[test]
    fn list_round_trips_through_json_text() {
        let f = FieldType::new("aliases", FieldKind::List);
        let value = Value::List(vec![Value::text("a"), Value::Int(2)]);

        let stored = ListCodec.to_storage(&value, &f).unwrap();
        let back = ListCodec.from_storage(stored, &f).unwrap();

        assert_eq!(back, value);
    }
}
