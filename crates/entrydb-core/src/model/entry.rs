use crate::model::{
    IdMode, Scope, SortOrder,
    action::Action,
    child::ChildEntryType,
    field::FieldType,
    hook::{HookFn, HookList, HookPhase},
};
use convert_case::{Case, Casing};

///
/// EntryType
///
/// The declarative schema for one business object type. Built once at
/// process start, immutable afterwards, shared across all tenants via `Arc`.
///

#[derive(Clone, Debug)]
pub struct EntryType {
    pub name: String,
    pub table: String,
    pub id_mode: IdMode,
    pub scope: Scope,

    /// Core types are engine/system types; the `default` role is granted
    /// access to every non-core type only.
    pub core: bool,

    /// Field supplying the human-readable label for rows of this type.
    pub title_field: Option<String>,

    pub default_list_fields: Vec<String>,
    pub default_sort: Option<(String, SortOrder)>,
    pub search_fields: Vec<String>,

    /// Uniqueness indexes; each inner list is one composite index.
    pub uniques: Vec<Vec<String>>,

    pub fields: Vec<FieldType>,
    pub children: Vec<ChildEntryType>,
    pub hooks: HookList,
    pub actions: Vec<Action>,
}

impl EntryType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = name.to_case(Case::Snake);

        Self {
            name,
            table,
            id_mode: IdMode::default(),
            scope: Scope::default(),
            core: false,
            title_field: None,
            default_list_fields: Vec::new(),
            default_sort: None,
            search_fields: Vec::new(),
            uniques: Vec::new(),
            fields: Vec::new(),
            children: Vec::new(),
            hooks: HookList::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub const fn id_mode(mut self, mode: IdMode) -> Self {
        self.id_mode = mode;
        self
    }

    #[must_use]
    pub const fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub const fn core_type(mut self) -> Self {
        self.core = true;
        self
    }

    #[must_use]
    pub fn title(mut self, field: impl Into<String>) -> Self {
        self.title_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn list_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_list_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.default_sort = Some((field.into(), order));
        self
    }

    #[must_use]
    pub fn search<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniques
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldType) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn child(mut self, child: ChildEntryType) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn hook(mut self, phase: HookPhase, hook: HookFn) -> Self {
        self.hooks.push(phase, hook);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    // lookups

    #[must_use]
    pub fn field_type(&self, key: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.key == key)
    }

    #[must_use]
    pub fn child_type(&self, name: &str) -> Option<&ChildEntryType> {
        self.children.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn find_action(&self, key: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.key == key)
    }

    /// Relation fields declared on this type, including child fields.
    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldType> {
        self.fields
            .iter()
            .chain(self.children.iter().flat_map(|c| c.fields.iter()))
            .filter(|f| f.relation.is_some())
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
        let et = EntryType::new("salesInvoice");
        assert_eq!(et.table, "sales_invoice");

        let et = EntryType::new("user").table_name("app_user");
        assert_eq!(et.table, "app_user");
    }

    #[test]
    fn lookups_find_declared_parts() {
        let et = EntryType::new("invoice")
            .field(FieldType::new("total", FieldKind::Currency))
            .field(FieldType::relation("customer", "customer"))
            .child(ChildEntryType::new("lines"));

        assert!(et.field_type("total").is_some());
        assert!(et.child_type("lines").is_some());
        assert!(et.field_type("nope").is_none());
        assert_eq!(et.relation_fields().count(), 1);
    }

    #[test]
    fn relation_fields_include_children() {
        let et = EntryType::new("invoice").child(
            ChildEntryType::new("lines").field(FieldType::relation("item", "item")),
        );

        assert_eq!(et.relation_fields().count(), 1);
    }
}
