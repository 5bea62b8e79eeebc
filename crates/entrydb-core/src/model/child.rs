use crate::model::field::FieldType;
use convert_case::{Case, Casing};

///
/// ChildEntryType
///
/// A named child collection owned exclusively by a parent entry type. Child
/// rows live in their own table, keyed by a `parent_id` column, and are
/// persisted after the parent row within the same logical save.
///

#[derive(Clone, Debug)]
pub struct ChildEntryType {
    /// Collection key as addressed in `update()` payloads.
    pub name: String,
    /// Base table name; prefixed per namespace like any entry table.
    pub table: String,
    pub fields: Vec<FieldType>,
}

impl ChildEntryType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = name.to_case(Case::Snake);

        Self {
            name,
            table,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldType) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn field_type(&self, key: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.key == key)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use entrydb_primitives::FieldKind;

    #[test]
    fn table_defaults_to_snake_case_name() {
        let child = ChildEntryType::new("orderLines");
        assert_eq!(child.table, "order_lines");
    }

    #[test]
    fn fields_are_addressable_by_key() {
        let child = ChildEntryType::new("lines")
            .field(FieldType::new("sku", FieldKind::Text))
            .field(FieldType::new("qty", FieldKind::Number));

        assert!(child.field_type("sku").is_some());
        assert!(child.field_type("missing").is_none());
    }
}
