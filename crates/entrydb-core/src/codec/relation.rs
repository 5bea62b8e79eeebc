use crate::{
    codec::{ColumnType, FieldCodec, StorageValue},
    model::field::FieldType,
    value::Value,
};
use entrydb_primitives::FieldKind;

///
/// RelationCodec
///
/// A reference to another entry by id: integer for auto-increment targets,
/// text for ulid/uuid targets. That the referenced entry type exists is a
/// schema-build invariant, checked before the engine serves anything.
///

pub(crate) struct RelationCodec;

impl FieldCodec for RelationCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Relation
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::Int(_) | Value::Text(_) => Ok(raw),
            other => Err(format!("expected an entry id, got {}", other.type_label())),
        }
    }

    fn validate(&self, value: &Value, _field: &FieldType) -> Result<(), String> {
        match value {
            Value::Int(_) => Ok(()),
            Value::Text(s) if !s.is_empty() => Ok(()),
            Value::Text(_) => Err("referenced id must not be empty".to_string()),
            other => Err(format!("expected an entry id, got {}", other.type_label())),
        }
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Int(n) => Ok(StorageValue::Integer(*n)),
            Value::Text(s) => Ok(StorageValue::Text(s.clone())),
            other => Err(format!("expected an entry id, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Integer(n) => Ok(Value::Int(n)),
            StorageValue::Text(s) => Ok(Value::Text(s)),
            other => Err(format!("unexpected relation storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        // The migration planner overrides this per target id mode.
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
    fn relation_accepts_both_id_shapes() {
        let f = FieldType::relation("owner", "user");
        assert!(RelationCodec.validate(&Value::Int(7), &f).is_ok());
        assert!(RelationCodec.validate(&Value::text("01HV5"), &f).is_ok());
        assert!(RelationCodec.validate(&Value::text(""), &f).is_err());
        assert!(RelationCodec.validate(&Value::Bool(true), &f).is_err());
    }
}
