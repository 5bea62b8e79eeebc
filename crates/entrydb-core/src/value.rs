use entrydb_primitives::{Float64, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

///
/// Value
///
/// Dynamic field value as held by the entry/settings runtime. Codecs
/// normalize caller input into this shape and translate it to and from the
/// storage representation.
///
/// Null → the field holds no value (SQL NULL).
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(Float64),
    Text(String),
    Timestamp(Timestamp),
    List(Vec<Self>),
    Json(JsonValue),
}

impl Value {
    /// Wrap a finite f64; non-finite input collapses to Null.
    #[must_use]
    pub fn float(v: f64) -> Self {
        Float64::try_new(v).map_or(Self::Null, Self::Float)
    }

    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Stable label for diagnostics and validation messages.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Json(_) => "json",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, empty text, and empty lists all count as "no value" for the
    /// required-field check and for `isEmpty` semantics.
    #[must_use]
    pub fn is_empty_like(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Timestamp(ts) => Some(ts.as_millis()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(f.get()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a JSON document into the runtime value shape. Integral
    /// numbers become `Int`, other numbers `Float`, objects stay `Json`.
    #[must_use]
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => n.as_i64().map_or_else(
                || n.as_f64().map_or(Self::Null, Self::float),
                Self::Int,
            ),
            JsonValue::String(s) => Self::Text(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            obj @ JsonValue::Object(_) => Self::Json(obj),
        }
    }

    /// Render as a JSON document; timestamps serialize as epoch millis.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => JsonNumber::from_f64(f.get())
                .map_or(JsonValue::Null, JsonValue::Number),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(ts) => JsonValue::Number(ts.as_millis().into()),
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Json(json) => json.clone(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(JsonValue::deserialize(deserializer)?))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}

/// Convenience for building object payloads in hooks and tests.
#[must_use]
pub fn json_object(pairs: &[(&str, Value)]) -> Value {
    let mut map = JsonMap::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), value.to_json());
    }

    Value::Json(JsonValue::Object(map))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_scalars() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(-7),
            Value::float(2.5),
            Value::text("ada"),
            Value::List(vec![Value::Int(1), Value::text("x")]),
        ];

        for value in values {
            let back = Value::from_json(value.to_json());
            assert_eq!(back, value, "round trip changed {value:?}");
        }
    }

    #[test]
    fn integral_json_numbers_become_int() {
        assert_eq!(Value::from_json(serde_json::json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Value::float(1.5));
    }

    #[test]
    fn empty_like_covers_null_text_and_list() {
        assert!(Value::Null.is_empty_like());
        assert!(Value::text("").is_empty_like());
        assert!(Value::List(vec![]).is_empty_like());
        assert!(!Value::Int(0).is_empty_like());
        assert!(!Value::Bool(false).is_empty_like());
    }

    #[test]
    fn timestamp_serializes_as_millis() {
        let value = Value::Timestamp(Timestamp::from_millis(1_000));
        assert_eq!(value.to_json(), serde_json::json!(1_000));
    }

    #[test]
    fn objects_stay_json() {
        let value = Value::from_json(serde_json::json!({"a": 1}));
        assert!(matches!(value, Value::Json(_)));
    }

    #[test]
    fn json_object_builds_from_pairs() {
        let value = json_object(&[("sku", Value::text("A-1")), ("qty", Value::Int(2))]);
        assert_eq!(
            value.to_json(),
            serde_json::json!({"sku": "A-1", "qty": 2})
        );
    }
}
