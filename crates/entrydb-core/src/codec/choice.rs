use crate::{
    codec::{ColumnType, FieldCodec, StorageValue},
    model::field::FieldType,
    value::Value,
};
use entrydb_primitives::FieldKind;

///
/// ChoiceCodec
///
/// A single selection out of the field's declared options.
///

pub(crate) struct ChoiceCodec;

impl FieldCodec for ChoiceCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Choice
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::Text(_) => Ok(raw),
            other => Err(format!("expected a choice value, got {}", other.type_label())),
        }
    }

    fn validate(&self, value: &Value, field: &FieldType) -> Result<(), String> {
        let Value::Text(choice) = value else {
            return Err(format!("expected a choice value, got {}", value.type_label()));
        };

        if field.options.iter().any(|o| o == choice) {
            Ok(())
        } else {
            Err(format!("'{choice}' is not one of the allowed options"))
        }
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Text(s) => Ok(StorageValue::Text(s.clone())),
            other => Err(format!("expected a choice value, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Text(s) => Ok(Value::Text(s)),
            other => Err(format!("unexpected choice storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Text
    }
}

///
/// MultiChoiceCodec
///
/// A set of selections, stored as one JSON-encoded text column.
///

pub(crate) struct MultiChoiceCodec;

impl FieldCodec for MultiChoiceCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::MultiChoice
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::List(_) => Ok(raw),
            // single selections are accepted and wrapped
            Value::Text(s) => Ok(Value::List(vec![Value::Text(s)])),
            other => Err(format!("expected a selection list, got {}", other.type_label())),
        }
    }

    fn validate(&self, value: &Value, field: &FieldType) -> Result<(), String> {
        let Value::List(items) = value else {
            return Err(format!("expected a selection list, got {}", value.type_label()));
        };

        for item in items {
            let Value::Text(choice) = item else {
                return Err(format!("selection must be text, got {}", item.type_label()));
            };
            if !field.options.iter().any(|o| o == choice) {
                return Err(format!("'{choice}' is not one of the allowed options"));
            }
        }

        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::List(_) => Ok(StorageValue::Text(value.to_json().to_string())),
            other => Err(format!("expected a selection list, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Text(s) => {
                let json: serde_json::Value =
                    serde_json::from_str(&s).map_err(|e| format!("selection decode: {e}"))?;
                Ok(Value::from_json(json))
            }
            other => Err(format!("unexpected selection storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Text
    }
}

///
/// TESTS
///
