use crate::{
    codec::{
        ColumnType, FieldCodec, StorageValue,
        scalar::{normalize_numeric, numeric_from_storage, numeric_to_storage},
    },
    model::field::FieldType,
    value::Value,
};
use entrydb_primitives::FieldKind;

///
/// CurrencyCodec
///
/// Monetary amounts; numeric in storage. The effective currency code comes
/// from the field declaration, falling back to the process-wide default
/// resolved at registry bootstrap.
///

pub(crate) struct CurrencyCodec {
    default_code: String,
}

impl CurrencyCodec {
    pub(crate) fn new(default_code: &str) -> Self {
        Self {
            default_code: default_code.to_string(),
        }
    }

    /// The currency code in effect for one field.
    pub(crate) fn effective_code<'a>(&'a self, field: &'a FieldType) -> &'a str {
        field.currency.as_deref().unwrap_or(&self.default_code)
    }
}

impl FieldCodec for CurrencyCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Currency
    }

    fn normalize(&self, raw: Value, _field: &FieldType) -> Result<Value, String> {
        normalize_numeric(raw)
    }

    fn validate(&self, value: &Value, field: &FieldType) -> Result<(), String> {
        match value {
            Value::Int(_) | Value::Float(_) => {
                // a resolvable code is part of the amount's meaning
                if self.effective_code(field).is_empty() {
                    Err("no currency code resolvable for this field".to_string())
                } else {
                    Ok(())
                }
            }
            other => Err(format!("expected an amount, got {}", other.type_label())),
        }
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
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_code_falls_back_to_process_default() {
        let codec = CurrencyCodec::new("EUR");

        let bare = FieldType::new("total", FieldKind::Currency);
        assert_eq!(codec.effective_code(&bare), "EUR");

        let declared = FieldType::new("total", FieldKind::Currency).currency_code("GBP");
        assert_eq!(codec.effective_code(&declared), "GBP");
    }

    #[test]
    fn amounts_normalize_like_numbers() {
        let codec = CurrencyCodec::new("USD");
        let f = FieldType::new("total", FieldKind::Currency);

        assert_eq!(codec.normalize(Value::text("19.99"), &f).unwrap(), Value::float(19.99));
        assert!(codec.validate(&Value::float(19.99), &f).is_ok());
    }
}
