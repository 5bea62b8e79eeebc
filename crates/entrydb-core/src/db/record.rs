use crate::{db::context::ScopeContext, value::Value};
use std::collections::BTreeMap;

/// Current field values of one runtime record.
pub type ValueMap = BTreeMap<String, Value>;

///
/// FieldChange
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldChange {
    pub previous: Value,
    pub new: Value,
}

///
/// Ledger
///
/// The modification ledger: field changes accumulated since the last
/// load/create, cleared on load. Scopes what gets persisted and what
/// triggers denormalization propagation. A change back to the original
/// value drops out of the ledger.
///

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    changes: BTreeMap<String, FieldChange>,
}

impl Ledger {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Record a mutation. The first recorded `previous` for a field is kept
    /// across subsequent writes within the same load/create window.
    pub fn record(&mut self, field: &str, previous: Value, new: Value) {
        match self.changes.get_mut(field) {
            Some(change) => {
                if change.previous == new {
                    self.changes.remove(field);
                } else {
                    change.new = new;
                }
            }
            None => {
                if previous != new {
                    self.changes.insert(
                        field.to_string(),
                        FieldChange { previous, new },
                    );
                }
            }
        }
    }

    /// Rewrite the pending `new` value for an already-recorded field;
    /// normalization uses this so encoded and propagated values agree.
    pub fn set_new(&mut self, field: &str, new: Value) {
        if let Some(change) = self.changes.get_mut(field) {
            change.new = new;
        }
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.changes.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.changes.keys()
    }
}

///
/// HookScope
///
/// What a lifecycle hook sees: the record's values and ledger, whether this
/// save creates the row, and the request context. Hook writes are recorded
/// in the ledger like any other mutation and bypass role field permissions
/// (hooks are server-side code).
///

pub struct HookScope<'a> {
    type_name: &'a str,
    values: &'a mut ValueMap,
    ledger: &'a mut Ledger,
    is_new: bool,
    ctx: &'a ScopeContext,
}

impl<'a> HookScope<'a> {
    pub(crate) fn new(
        type_name: &'a str,
        values: &'a mut ValueMap,
        ledger: &'a mut Ledger,
        is_new: bool,
        ctx: &'a ScopeContext,
    ) -> Self {
        Self {
            type_name,
            values,
            ledger,
            is_new,
            ctx,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub const fn context(&self) -> &ScopeContext {
        self.ctx
    }

    /// Current value of a field, Null when unset.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Set a field value, recording the change in the ledger.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        let new = value.into();
        let previous = self.get(field);

        self.ledger.record(field, previous, new.clone());
        self.values.insert(field.to_string(), new);
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_keeps_first_previous_value() {
        let mut ledger = Ledger::new();
        ledger.record("name", Value::text("a"), Value::text("b"));
        ledger.record("name", Value::text("b"), Value::text("c"));

        let change = ledger.get("name").expect("change recorded");
        assert_eq!(change.previous, Value::text("a"));
        assert_eq!(change.new, Value::text("c"));
    }

    #[test]
    fn reverting_a_change_empties_the_ledger() {
        let mut ledger = Ledger::new();
        ledger.record("name", Value::text("a"), Value::text("b"));
        ledger.record("name", Value::text("b"), Value::text("a"));

        assert!(ledger.is_empty(), "revert must drop the ledger entry");
    }

    #[test]
    fn identical_writes_are_not_recorded() {
        let mut ledger = Ledger::new();
        ledger.record("name", Value::text("a"), Value::text("a"));

        assert!(ledger.is_empty());
    }

    #[test]
    fn hook_scope_writes_flow_into_the_ledger() {
        let mut values = ValueMap::new();
        values.insert("first".to_string(), Value::text("Ada"));
        let mut ledger = Ledger::new();
        let ctx = ScopeContext::admin();

        let mut scope = HookScope::new("user", &mut values, &mut ledger, true, &ctx);
        let first = scope.get("first");
        assert_eq!(first, Value::text("Ada"));

        scope.set("full", Value::text("Ada Lovelace"));

        assert_eq!(values.get("full"), Some(&Value::text("Ada Lovelace")));
        assert!(ledger.contains("full"));
    }
}
