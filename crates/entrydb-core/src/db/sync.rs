//! Connection Registry synchronizer: keeps denormalized display columns in
//! step with the title-like fields they were fetched from. Propagation runs
//! after the triggering save has committed; it is at-least-once and never
//! rolls the save back.

use crate::{
    codec::StorageValue,
    db::{
        context::ScopeContext,
        record::Ledger,
        store::SqliteBackend,
    },
    error::EngineError,
    model::{Scope, build::Schema},
    value::Value,
};
use std::{collections::BTreeMap, fmt};
use tracing::{debug, warn};

///
/// ConnectionEdge
///
/// One propagation edge: when `(source type, source field)` changes, every
/// row of `target_table` whose `identifying_column` equals the changed
/// entry's id gets `display_column` set to the new value.
///

#[derive(Clone, Debug)]
pub struct ConnectionEdge {
    pub target_type: String,
    pub target_scope: Scope,
    pub target_table: String,
    pub identifying_column: String,
    pub display_column: String,
}

///
/// ConnectionRegistry
///
/// Reverse index built once at schema-build time from every relation field
/// that declares a display fetch. Read-only afterwards.
///

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    edges: BTreeMap<(String, String), Vec<ConnectionEdge>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn build(schema: &Schema) -> Self {
        let mut edges: BTreeMap<(String, String), Vec<ConnectionEdge>> = BTreeMap::new();

        let mut record = |target: &str,
                          source_field: &str,
                          edge: ConnectionEdge| {
            edges
                .entry((target.to_string(), source_field.to_string()))
                .or_default()
                .push(edge);
        };

        for et in schema.entry_types() {
            for field in &et.fields {
                let Some(relation) = &field.relation else {
                    continue;
                };
                let Some(display) = &relation.display else {
                    continue;
                };

                record(
                    &relation.target,
                    &display.source_field,
                    ConnectionEdge {
                        target_type: et.name.clone(),
                        target_scope: et.scope,
                        target_table: et.table.clone(),
                        identifying_column: field.key.clone(),
                        display_column: display.into.clone(),
                    },
                );
            }

            // child collections keep their own denormalized columns in step
            for child in &et.children {
                for field in &child.fields {
                    let Some(relation) = &field.relation else {
                        continue;
                    };
                    let Some(display) = &relation.display else {
                        continue;
                    };

                    record(
                        &relation.target,
                        &display.source_field,
                        ConnectionEdge {
                            target_type: et.name.clone(),
                            target_scope: et.scope,
                            target_table: child.table.clone(),
                            identifying_column: field.key.clone(),
                            display_column: display.into.clone(),
                        },
                    );
                }
            }
        }

        Self { edges }
    }

    #[must_use]
    pub fn edges_for(&self, source_type: &str, source_field: &str) -> &[ConnectionEdge] {
        self.edges
            .get(&(source_type.to_string(), source_field.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Whether any ledger field of this source type is a registered
    /// denormalization source.
    #[must_use]
    pub fn has_sources(&self, source_type: &str, ledger: &Ledger) -> bool {
        ledger
            .fields()
            .any(|field| !self.edges_for(source_type, field).is_empty())
    }
}

///
/// SyncFailure
///
/// One failed propagation; reported alongside the otherwise-successful save.
///

#[derive(Clone, Debug)]
pub struct SyncFailure {
    pub target_table: String,
    pub message: String,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target_table, self.message)
    }
}

/// Propagate committed changes of one entry along every registered edge.
/// Failures are collected, logged, and surfaced to the caller; the entry's
/// own row is already durably saved and no retry happens here.
pub(crate) fn propagate(
    registry: &ConnectionRegistry,
    backend: &SqliteBackend,
    ctx: &ScopeContext,
    source_type: &str,
    source_id: &StorageValue,
    ledger: &Ledger,
) -> Vec<SyncFailure> {
    let mut failures = Vec::new();

    for (field, change) in ledger.iter() {
        for edge in registry.edges_for(source_type, field) {
            let Ok(ns) = ctx.namespace_for(edge.target_scope, &edge.target_type) else {
                // a tenant-scoped target is unreachable from an unbound
                // context; nothing to update in this request's view
                debug!(
                    target_type = %edge.target_type,
                    "skipping propagation into unbound tenant namespace"
                );
                continue;
            };

            let table = ns.table(&edge.target_table);
            let new_value = encode_display_value(&change.new);
            let sql = format!(
                "UPDATE \"{table}\" SET \"{}\" = ?1 WHERE \"{}\" = ?2",
                edge.display_column, edge.identifying_column
            );

            match backend.execute(&sql, &[new_value, source_id.clone()]) {
                Ok(affected) => {
                    debug!(%table, affected, "propagated display value");
                }
                Err(err) => {
                    warn!(%table, error = %err, "display propagation failed");
                    failures.push(SyncFailure {
                        target_table: table,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    failures
}

/// Propagation failures ride on the save report; turn them into one error
/// when a caller wants a hard signal instead.
#[must_use]
pub fn failures_to_error(failures: &[SyncFailure]) -> Option<EngineError> {
    if failures.is_empty() {
        return None;
    }

    let mut err = crate::error::ValidationError::new();
    for failure in failures {
        err.add(failure.target_table.clone(), failure.message.clone());
    }

    Some(err.into())
}

fn encode_display_value(value: &Value) -> StorageValue {
    match value {
        Value::Null => StorageValue::Null,
        Value::Bool(b) => StorageValue::Integer(i64::from(*b)),
        Value::Int(n) => StorageValue::Integer(*n),
        Value::Float(f) => StorageValue::Real(f.get()),
        Value::Text(s) => StorageValue::Text(s.clone()),
        Value::Timestamp(ts) => StorageValue::Integer(ts.as_millis()),
        other => StorageValue::Text(other.to_json().to_string()),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SchemaBuilder, entry::EntryType, field::FieldType};
    use entrydb_primitives::FieldKind;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entry_type(
                EntryType::new("customer")
                    .field(FieldType::new("full_name", FieldKind::Text))
                    .title("full_name"),
            )
            .entry_type(
                EntryType::new("invoice")
                    .field(
                        FieldType::relation("customer", "customer")
                            .fetch_display("full_name", "customer_name"),
                    )
                    .field(FieldType::new("customer_name", FieldKind::Text).read_only()),
            )
            .build()
            .expect("schema builds")
    }

    #[test]
    fn registry_records_edges_from_display_fetches() {
        let registry = ConnectionRegistry::build(&schema());
        let edges = registry.edges_for("customer", "full_name");

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_type, "invoice");
        assert_eq!(edges[0].identifying_column, "customer");
        assert_eq!(edges[0].display_column, "customer_name");
    }

    #[test]
    fn unrelated_fields_have_no_edges() {
        let registry = ConnectionRegistry::build(&schema());
        assert!(registry.edges_for("customer", "email").is_empty());
        assert!(registry.edges_for("invoice", "customer_name").is_empty());
    }

    #[test]
    fn has_sources_consults_the_ledger() {
        let registry = ConnectionRegistry::build(&schema());

        let mut ledger = Ledger::new();
        ledger.record("full_name", Value::text("a"), Value::text("b"));
        assert!(registry.has_sources("customer", &ledger));

        let mut unrelated = Ledger::new();
        unrelated.record("email", Value::text("a"), Value::text("b"));
        assert!(!registry.has_sources("customer", &unrelated));
    }
}
