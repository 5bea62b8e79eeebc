//! Field Type Registry: one codec per semantic field kind, registered into a
//! read-only lookup table at engine start and shared, never cloned, across
//! all contexts.

mod choice;
mod currency;
mod json;
mod relation;
mod scalar;

use crate::model::field::FieldType;
use crate::value::Value;
use entrydb_primitives::FieldKind;
use std::collections::HashMap;

pub(crate) use choice::{ChoiceCodec, MultiChoiceCodec};
pub(crate) use currency::CurrencyCodec;
pub(crate) use json::{JsonCodec, ListCodec};
pub(crate) use relation::RelationCodec;
pub(crate) use scalar::{BooleanCodec, NumberCodec, TextCodec, TimestampCodec};

///
/// StorageValue
///
/// The storage representation a codec produces and consumes. Mirrors the
/// scalar shapes the relational backend can hold in one column.
///

#[derive(Clone, Debug, PartialEq)]
pub enum StorageValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl StorageValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

///
/// ColumnType
///
/// Column affinity a field kind migrates to.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Integer,
    Numeric,
    Text,
}

impl ColumnType {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Numeric => "NUMERIC",
            Self::Text => "TEXT",
        }
    }
}

///
/// FieldCodec
///
/// Contract per field kind. Validation failures are reported as messages,
/// never thrown: the entry runtime accumulates them into one aggregated
/// validation error per save.
///

pub trait FieldCodec: Send + Sync {
    fn kind(&self) -> FieldKind;

    /// Coerce caller input into the canonical runtime value for this kind.
    fn normalize(&self, raw: Value, field: &FieldType) -> Result<Value, String>;

    /// Check a normalized, non-null value. Null/required handling is the
    /// runtime's concern.
    fn validate(&self, value: &Value, field: &FieldType) -> Result<(), String>;

    /// Encode a normalized value for one storage column.
    fn to_storage(&self, value: &Value, field: &FieldType) -> Result<StorageValue, String>;

    /// Decode one storage column back into the runtime value.
    fn from_storage(&self, raw: StorageValue, field: &FieldType) -> Result<Value, String>;

    /// Column affinity for migration DDL. Relation columns are special-cased
    /// by the migration planner, which knows the target's id mode.
    fn column_type(&self, field: &FieldType) -> ColumnType;
}

///
/// CodecRegistry
///
/// Populated once at process start; read-only thereafter.
///

pub struct CodecRegistry {
    codecs: HashMap<FieldKind, Box<dyn FieldCodec>>,
}

impl CodecRegistry {
    /// Register every builtin codec. `default_currency` comes from process
    /// configuration and backs currency fields with no declared code.
    #[must_use]
    pub fn bootstrap(default_currency: &str) -> Self {
        let codecs: Vec<Box<dyn FieldCodec>> = vec![
            Box::new(TextCodec::new(FieldKind::Text)),
            Box::new(TextCodec::new(FieldKind::File)),
            Box::new(TextCodec::new(FieldKind::Image)),
            Box::new(NumberCodec),
            Box::new(BooleanCodec),
            Box::new(TimestampCodec),
            Box::new(ChoiceCodec),
            Box::new(MultiChoiceCodec),
            Box::new(RelationCodec),
            Box::new(CurrencyCodec::new(default_currency)),
            Box::new(JsonCodec),
            Box::new(ListCodec),
        ];

        Self {
            codecs: codecs.into_iter().map(|c| (c.kind(), c)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, kind: FieldKind) -> &dyn FieldCodec {
        self.codecs
            .get(&kind)
            .map(Box::as_ref)
            .expect("bootstrap registers a codec for every field kind")
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("kinds", &self.codecs.len())
            .finish()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_covers_every_kind() {
        let registry = CodecRegistry::bootstrap("USD");
        for kind in FieldKind::ALL {
            assert_eq!(registry.get(*kind).kind(), *kind);
        }
    }
}
