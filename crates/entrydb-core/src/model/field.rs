use crate::value::Value;
use entrydb_primitives::FieldKind;

///
/// FieldType
///
/// Immutable field descriptor referenced by every runtime instance of the
/// declaring type. Kind-specific metadata rides alongside the flags rather
/// than in per-kind descriptor structs.
///

#[derive(Clone, Debug)]
pub struct FieldType {
    pub key: String,
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    pub hidden: bool,
    pub default: Option<Value>,

    /// Allowed options for choice and multi-choice fields.
    pub options: Vec<String>,

    /// Relation metadata; present iff `kind == Relation`.
    pub relation: Option<RelationMeta>,

    /// Currency code override; unset falls back to process configuration.
    pub currency: Option<String>,
}

impl FieldType {
    #[must_use]
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
            read_only: false,
            hidden: false,
            default: None,
            options: Vec::new(),
            relation: None,
            currency: None,
        }
    }

    /// Declare a relation field referencing another entry type by id.
    #[must_use]
    pub fn relation(key: impl Into<String>, target: impl Into<String>) -> Self {
        let mut field = Self::new(key, FieldKind::Relation);
        field.relation = Some(RelationMeta {
            target: target.into(),
            display: None,
        });

        field
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn currency_code(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    /// Declare that this relation keeps a denormalized copy of the target's
    /// `source_field` in this type's `into` column, maintained by the
    /// connection synchronizer.
    #[must_use]
    pub fn fetch_display(mut self, source_field: impl Into<String>, into: impl Into<String>) -> Self {
        if let Some(relation) = &mut self.relation {
            relation.display = Some(DisplayFetch {
                source_field: source_field.into(),
                into: into.into(),
            });
        }

        self
    }

    /// Default applied at create time and by the read-only backfill.
    #[must_use]
    pub fn default_or_null(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }
}

///
/// RelationMeta
///

#[derive(Clone, Debug)]
pub struct RelationMeta {
    /// Referenced entry type name.
    pub target: String,
    /// Optional denormalized title fetch.
    pub display: Option<DisplayFetch>,
}

///
/// DisplayFetch
///
/// `source_field` lives on the referenced type; `into` is the denormalized
/// display column on the declaring type.
///

#[derive(Clone, Debug)]
pub struct DisplayFetch {
    pub source_field: String,
    pub into: String,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_flags_compose() {
        let field = FieldType::new("email", FieldKind::Text).required().hidden();

        assert!(field.required);
        assert!(field.hidden);
        assert!(!field.read_only);
        assert!(field.default.is_none());
    }

    #[test]
    fn relation_carries_target_and_display() {
        let field = FieldType::relation("customer", "customer")
            .fetch_display("full_name", "customer_name");

        let relation = field.relation.expect("relation meta");
        assert_eq!(relation.target, "customer");

        let display = relation.display.expect("display fetch");
        assert_eq!(display.source_field, "full_name");
        assert_eq!(display.into, "customer_name");
    }

    #[test]
    fn fetch_display_on_non_relation_is_inert() {
        let field = FieldType::new("age", FieldKind::Number).fetch_display("x", "y");
        assert!(field.relation.is_none());
    }

    #[test]
    fn default_or_null_falls_back() {
        let with_default = FieldType::new("status", FieldKind::Choice)
            .options(["open", "closed"])
            .default_value("open");
        assert_eq!(with_default.default_or_null(), Value::text("open"));

        let bare = FieldType::new("note", FieldKind::Text);
        assert_eq!(bare.default_or_null(), Value::Null);
    }
}
