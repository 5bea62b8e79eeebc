use crate::{
    codec::CodecRegistry,
    db::record::ValueMap,
    error::{EngineError, ValidationError},
    model::child::ChildEntryType,
    value::Value,
};

///
/// ChildList
///
/// Runtime state of one named child collection. Child rows are owned
/// exclusively by the parent entry; an update replaces the whole collection
/// and is persisted after the parent row within the same logical save.
///

#[derive(Clone, Debug)]
pub struct ChildList {
    pub(crate) decl: ChildEntryType,
    rows: Vec<ValueMap>,
    pending: Option<Vec<ValueMap>>,
}

impl ChildList {
    #[must_use]
    pub(crate) fn new(decl: ChildEntryType) -> Self {
        Self {
            decl,
            rows: Vec::new(),
            pending: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    /// Rows as last loaded or saved.
    #[must_use]
    pub fn rows(&self) -> &[ValueMap] {
        &self.rows
    }

    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn set_loaded(&mut self, rows: Vec<ValueMap>) {
        self.rows = rows;
        self.pending = None;
    }

    pub(crate) fn pending(&self) -> Option<&[ValueMap]> {
        self.pending.as_deref()
    }

    pub(crate) fn mark_saved(&mut self) {
        if let Some(rows) = self.pending.take() {
            self.rows = rows;
        }
    }

    /// Accept an update payload for the whole collection: a list of objects,
    /// one per child row.
    pub(crate) fn update_from(&mut self, value: &Value) -> Result<(), EngineError> {
        let Value::List(items) = value else {
            let mut err = ValidationError::new();
            err.add(&self.decl.name, "child collections take a list of objects");
            return Err(err.into());
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Value::Json(serde_json::Value::Object(object)) = item else {
                let mut err = ValidationError::new();
                err.add(
                    format!("{}.{index}", self.decl.name),
                    "child rows must be objects",
                );
                return Err(err.into());
            };

            let mut row = ValueMap::new();
            for (key, raw) in object {
                // unknown keys are silently ignored, as in parent updates
                if self.decl.field_type(key).is_some() {
                    row.insert(key.clone(), Value::from_json(raw.clone()));
                }
            }
            rows.push(row);
        }

        self.pending = Some(rows);

        Ok(())
    }

    /// Normalize and validate pending rows through the codec registry,
    /// accumulating issues under `collection.index.field` keys.
    pub(crate) fn normalize_pending(
        &mut self,
        codecs: &CodecRegistry,
        issues: &mut ValidationError,
    ) {
        let name = self.decl.name.clone();
        let Some(rows) = &mut self.pending else {
            return;
        };

        for (index, row) in rows.iter_mut().enumerate() {
            for field in &self.decl.fields {
                let codec = codecs.get(field.kind);
                let raw = row.get(&field.key).cloned().unwrap_or(Value::Null);

                let value = match codec.normalize(raw, field) {
                    Ok(value) => value,
                    Err(message) => {
                        issues.add(format!("{name}.{index}.{}", field.key), message);
                        continue;
                    }
                };

                if value.is_empty_like() {
                    if field.required {
                        issues.add(
                            format!("{name}.{index}.{}", field.key),
                            "required value is missing",
                        );
                    }
                } else if let Err(message) = codec.validate(&value, field) {
                    issues.add(format!("{name}.{index}.{}", field.key), message);
                }

                row.insert(field.key.clone(), value);
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::FieldType;
    use entrydb_primitives::FieldKind;

    fn lines() -> ChildList {
        ChildList::new(
            ChildEntryType::new("lines")
                .field(FieldType::new("sku", FieldKind::Text).required())
                .field(FieldType::new("qty", FieldKind::Number)),
        )
    }

    #[test]
    fn update_replaces_the_whole_collection() {
        let mut list = lines();
        let payload = Value::List(vec![
            Value::from_json(serde_json::json!({"sku": "A-1", "qty": 2, "ghost": true})),
            Value::from_json(serde_json::json!({"sku": "B-2"})),
        ]);

        list.update_from(&payload).unwrap();
        let pending = list.pending().unwrap();

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].get("sku"), Some(&Value::text("A-1")));
        assert!(!pending[0].contains_key("ghost"), "unknown keys are dropped");
    }

    #[test]
    fn non_list_payloads_are_rejected() {
        let mut list = lines();
        let err = list.update_from(&Value::text("nope")).unwrap_err();
        assert_eq!(err.status_class().code(), 400);
    }

    #[test]
    fn normalize_pending_flags_missing_required_fields() {
        let mut list = lines();
        list.update_from(&Value::List(vec![Value::from_json(
            serde_json::json!({"qty": "3"}),
        )]))
        .unwrap();

        let codecs = CodecRegistry::bootstrap("USD");
        let mut issues = ValidationError::new();
        list.normalize_pending(&codecs, &mut issues);

        assert!(!issues.is_empty());
        assert!(issues.issues.contains_key("lines.0.sku"), "{issues:?}");

        // qty text was still normalized to a number
        assert_eq!(list.pending().unwrap()[0].get("qty"), Some(&Value::Int(3)));
    }

    #[test]
    fn mark_saved_promotes_pending_rows() {
        let mut list = lines();
        list.update_from(&Value::List(vec![Value::from_json(
            serde_json::json!({"sku": "A-1"}),
        )]))
        .unwrap();

        assert!(list.is_dirty());
        list.mark_saved();

        assert!(!list.is_dirty());
        assert_eq!(list.rows().len(), 1);
    }
}
