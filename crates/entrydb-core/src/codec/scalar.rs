use crate::{
    codec::{ColumnType, FieldCodec, StorageValue},
    model::field::FieldType,
    value::Value,
};
use entrydb_primitives::{FieldKind, Timestamp};

///
/// TextCodec
///
/// Shared by the text, file, and image kinds; file/image values are paths or
/// handles managed by an external collaborator and stored as plain text.
///

pub(crate) struct TextCodec {
    kind: FieldKind,
}

impl TextCodec {
    pub(crate) const fn new(kind: FieldKind) -> Self {
        Self { kind }
    }
}

impl FieldCodec for TextCodec {
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::Text(_) => Ok(raw),
            Value::Int(n) => Ok(Value::Text(n.to_string())),
            Value::Float(f) => Ok(Value::Text(f.to_string())),
            other => Err(format!("expected text, got {}", other.type_label())),
        }
    }

    fn validate(&self, _value: &Value, _field: &FieldType) -> Result<(), String> {
        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Text(s) => Ok(StorageValue::Text(s.clone())),
            other => Err(format!("expected text, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Text(s) => Ok(Value::Text(s)),
            StorageValue::Integer(n) => Ok(Value::Text(n.to_string())),
            StorageValue::Real(f) => Ok(Value::Text(f.to_string())),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Text
    }
}

///
/// NumberCodec
///

pub(crate) struct NumberCodec;

pub(crate) fn normalize_numeric(raw: Value) -> Result<Value, String> {
    match raw {
        Value::Null | Value::Int(_) | Value::Float(_) => Ok(raw),
        Value::Text(s) => {
            if let Ok(n) = s.parse::<i64>() {
                return Ok(Value::Int(n));
            }
            s.parse::<f64>()
                .ok()
                .and_then(|f| {
                    let value = Value::float(f);
                    (!value.is_null()).then_some(value)
                })
                .ok_or_else(|| format!("not a number: {s}"))
        }
        other => Err(format!("expected a number, got {}", other.type_label())),
    }
}

pub(crate) fn numeric_to_storage(value: &Value) -> Result<StorageValue, String> {
    match value {
        Value::Null => Ok(StorageValue::Null),
        Value::Int(n) => Ok(StorageValue::Integer(*n)),
        Value::Float(f) => Ok(StorageValue::Real(f.get())),
        other => Err(format!("expected a number, got {}", other.type_label())),
    }
}

pub(crate) fn numeric_from_storage(raw: StorageValue) -> Result<Value, String> {
    match raw {
        StorageValue::Null => Ok(Value::Null),
        StorageValue::Integer(n) => Ok(Value::Int(n)),
        StorageValue::Real(f) => Ok(Value::float(f)),
        StorageValue::Text(s) => normalize_numeric(Value::Text(s)),
    }
}

impl FieldCodec for NumberCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Number
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        normalize_numeric(raw)
    }

    fn validate(&self, _value: &Value, _field: &FieldType) -> Result<(), String> {
        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        numeric_to_storage(value)
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        numeric_from_storage(raw)
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Numeric
    }
}

///
/// BooleanCodec
///

pub(crate) struct BooleanCodec;

impl FieldCodec for BooleanCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Boolean
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::Bool(_) => Ok(raw),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Text(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("not a boolean: {s}")),
            },
            other => Err(format!("expected a boolean, got {}", other.type_label())),
        }
    }

    fn validate(&self, _value: &Value, _field: &FieldType) -> Result<(), String> {
        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Bool(b) => Ok(StorageValue::Integer(i64::from(*b))),
            other => Err(format!("expected a boolean, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Integer(n) => Ok(Value::Bool(n != 0)),
            other => Err(format!("unexpected boolean storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Integer
    }
}

///
/// TimestampCodec
///
/// Stored as integer epoch milliseconds; accepts RFC 3339 strings on input.
///

pub(crate) struct TimestampCodec;

impl FieldCodec for TimestampCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Timestamp
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        match raw {
            Value::Null | Value::Timestamp(_) => Ok(raw),
            Value::Int(ms) => Ok(Value::Timestamp(Timestamp::from_millis(ms))),
            Value::Text(s) => Timestamp::parse_flexible(&s)
                .map(Value::Timestamp)
                .map_err(|e| e.to_string()),
            other => Err(format!("expected a timestamp, got {}", other.type_label())),
        }
    }

    fn validate(&self, _value: &Value, _field: &FieldType) -> Result<(), String> {
        Ok(())
    }

    fn to_storage(&self, value: &Value, _field: &FieldType) -> Result<StorageValue, String> {
        match value {
            Value::Null => Ok(StorageValue::Null),
            Value::Timestamp(ts) => Ok(StorageValue::Integer(ts.as_millis())),
            other => Err(format!("expected a timestamp, got {}", other.type_label())),
        }
    }

    fn from_storage(&self, raw: StorageValue, _field: &FieldType) -> Result<Value, String> {
        match raw {
            StorageValue::Null => Ok(Value::Null),
            StorageValue::Integer(ms) => Ok(Value::Timestamp(Timestamp::from_millis(ms))),
            StorageValue::Text(s) => Timestamp::parse_flexible(&s)
                .map(Value::Timestamp)
                .map_err(|e| e.to_string()),
            other => Err(format!("unexpected timestamp storage shape: {other:?}")),
        }
    }

    fn column_type(&self, _field: &FieldType) -> ColumnType {
        ColumnType::Integer
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: FieldKind) -> FieldType {
        FieldType::new("f", kind)
    }

    #[test]
    fn number_normalizes_integral_text() {
        let f = field(FieldKind::Number);
        assert_eq!(
            NumberCodec.normalize(Value::text("42"), &f).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            NumberCodec.normalize(Value::text("2.5"), &f).unwrap(),
            Value::float(2.5)
        );
        assert!(NumberCodec.normalize(Value::text("nope"), &f).is_err());
        assert!(NumberCodec.normalize(Value::Bool(true), &f).is_err());
    }

    #[test]
    fn number_storage_keeps_int_and_real_apart() {
        let f = field(FieldKind::Number);
        assert_eq!(
            NumberCodec.to_storage(&Value::Int(7), &f).unwrap(),
            StorageValue::Integer(7)
        );
        assert_eq!(
            NumberCodec.to_storage(&Value::float(1.5), &f).unwrap(),
            StorageValue::Real(1.5)
        );
        assert_eq!(
            NumberCodec
                .from_storage(StorageValue::Integer(7), &f)
                .unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn boolean_accepts_common_spellings() {
        let f = field(FieldKind::Boolean);
        for (raw, expected) in [
            (Value::Bool(true), true),
            (Value::Int(1), true),
            (Value::Int(0), false),
            (Value::text("true"), true),
            (Value::text("0"), false),
        ] {
            assert_eq!(
                BooleanCodec.normalize(raw, &f).unwrap(),
                Value::Bool(expected)
            );
        }
        assert!(BooleanCodec.normalize(Value::Int(2), &f).is_err());
    }

    #[test]
    fn timestamp_round_trips_through_storage() {
        let f = field(FieldKind::Timestamp);
        let ts = Value::Timestamp(Timestamp::from_millis(1_714_566_600_250));

        let stored = TimestampCodec.to_storage(&ts, &f).unwrap();
        assert_eq!(stored, StorageValue::Integer(1_714_566_600_250));

        let back = TimestampCodec.from_storage(stored, &f).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn timestamp_accepts_rfc3339_input() {
        let f = field(FieldKind::Timestamp);
        let normalized = TimestampCodec
            .normalize(Value::text("2024-05-01T12:30:00Z"), &f)
            .unwrap();

        assert!(matches!(normalized, Value::Timestamp(_)));
    }

    #[test]
    fn text_coerces_numbers_but_rejects_structures() {
        let f = field(FieldKind::Text);
        let codec = TextCodec::new(FieldKind::Text);

        assert_eq!(codec.normalize(Value::Int(5), &f).unwrap(), Value::text("5"));
        assert!(codec.normalize(Value::List(vec![]), &f).is_err());
    }
}
