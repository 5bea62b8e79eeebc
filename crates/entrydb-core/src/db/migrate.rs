//! Migration orchestration: compares the declared schema against the live
//! schema of one storage namespace and produces an ordered, idempotent
//! operation list. Plan mode is pure; migrate mode applies each operation in
//! its own transaction. Global and tenant namespaces never share a run.

use crate::{
    codec::{ColumnType, StorageValue},
    db::{Engine, context::Namespace},
    error::EngineError,
    model::{IdMode, Scope, child::ChildEntryType, entry::EntryType, field::FieldType},
};
use entrydb_primitives::FieldKind;
use std::{collections::BTreeSet, fmt};
use tracing::info;

///
/// MigrationOp
///
/// One schema-altering operation. `sql` is the complete statement; the
/// variant carries what the human-readable log reports.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MigrationOp {
    CreateTable { table: String, sql: String },
    AddColumn { table: String, column: String, sql: String },
    CreateIndex { name: String, sql: String },
    DropIndex { name: String, sql: String },
}

impl MigrationOp {
    #[must_use]
    pub fn sql(&self) -> &str {
        match self {
            Self::CreateTable { sql, .. }
            | Self::AddColumn { sql, .. }
            | Self::CreateIndex { sql, .. }
            | Self::DropIndex { sql, .. } => sql,
        }
    }
}

impl fmt::Display for MigrationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, .. } => write!(f, "create table {table}"),
            Self::AddColumn { table, column, .. } => write!(f, "add column {table}.{column}"),
            Self::CreateIndex { name, .. } => write!(f, "create index {name}"),
            Self::DropIndex { name, .. } => write!(f, "drop index {name}"),
        }
    }
}

/// Live-schema introspection helpers.
fn table_exists(engine: &Engine, table: &str) -> Result<bool, EngineError> {
    let rows = engine.backend().select(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
        &[StorageValue::Text(table.to_string())],
    )?;

    Ok(!rows.is_empty())
}

fn live_columns(engine: &Engine, table: &str) -> Result<BTreeSet<String>, EngineError> {
    let rows = engine
        .backend()
        .select(&format!("PRAGMA table_info(\"{table}\")"), &[])?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.get("name") {
            Some(StorageValue::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect())
}

fn live_unique_indexes(engine: &Engine, table: &str) -> Result<BTreeSet<String>, EngineError> {
    let rows = engine
        .backend()
        .select(&format!("PRAGMA index_list(\"{table}\")"), &[])?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let name = match row.get("name") {
                Some(StorageValue::Text(name)) => name.clone(),
                _ => return None,
            };
            let unique = matches!(row.get("unique"), Some(StorageValue::Integer(1)));

            (unique && name.starts_with(&format!("{table}_uq_"))).then_some(name)
        })
        .collect())
}

/// Resolve a relation target's physical table for a foreign key clause.
/// Cross-scope references from the global namespace into tenant space have
/// no single target table, so those columns carry no constraint.
fn relation_target_table(engine: &Engine, ns: &Namespace, target: &str) -> Option<String> {
    let target_type = engine.schema().entry_type(target)?;

    match (target_type.scope, ns) {
        (Scope::Global, _) => Some(Namespace::Global.table(&target_type.table)),
        (Scope::Tenant, Namespace::Tenant(_)) => Some(ns.table(&target_type.table)),
        (Scope::Tenant, Namespace::Global) => None,
    }
}

fn relation_column_type(engine: &Engine, target: &str) -> ColumnType {
    engine
        .schema()
        .entry_type(target)
        .map_or(ColumnType::Text, |t| match t.id_mode {
            IdMode::AutoIncrement => ColumnType::Integer,
            IdMode::Ulid | IdMode::Uuid => ColumnType::Text,
        })
}

fn column_ddl(engine: &Engine, ns: &Namespace, field: &FieldType) -> String {
    let (column_type, references) = match (&field.kind, &field.relation) {
        (FieldKind::Relation, Some(relation)) => (
            relation_column_type(engine, &relation.target),
            relation_target_table(engine, ns, &relation.target),
        ),
        _ => (
            engine.codecs().get(field.kind).column_type(field),
            None,
        ),
    };

    let mut ddl = format!("\"{}\" {}", field.key, column_type.sql());
    if let Some(target_table) = references {
        ddl.push_str(&format!(" REFERENCES \"{target_table}\"(\"id\")"));
    }

    ddl
}

fn id_column_ddl(id_mode: IdMode) -> &'static str {
    match id_mode {
        IdMode::AutoIncrement => "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
        IdMode::Ulid | IdMode::Uuid => "\"id\" TEXT PRIMARY KEY",
    }
}

fn entry_table_ops(
    engine: &Engine,
    ns: &Namespace,
    et: &EntryType,
    ops: &mut Vec<MigrationOp>,
) -> Result<(), EngineError> {
    let table = ns.table(&et.table);

    if table_exists(engine, &table)? {
        let existing = live_columns(engine, &table)?;
        for field in &et.fields {
            if !existing.contains(&field.key) {
                let ddl = column_ddl(engine, ns, field);
                ops.push(MigrationOp::AddColumn {
                    table: table.clone(),
                    column: field.key.clone(),
                    sql: format!("ALTER TABLE \"{table}\" ADD COLUMN {ddl}"),
                });
            }
        }
    } else {
        let mut columns = vec![id_column_ddl(et.id_mode).to_string()];
        columns.extend(et.fields.iter().map(|f| column_ddl(engine, ns, f)));
        columns.push("\"created_at\" INTEGER".to_string());
        columns.push("\"updated_at\" INTEGER".to_string());

        ops.push(MigrationOp::CreateTable {
            table: table.clone(),
            sql: format!("CREATE TABLE \"{table}\" ({})", columns.join(", ")),
        });
    }

    // uniqueness constraints live as named unique indexes
    let live = if table_exists(engine, &table)? {
        live_unique_indexes(engine, &table)?
    } else {
        BTreeSet::new()
    };

    let mut declared = BTreeSet::new();
    for unique in &et.uniques {
        let name = format!("{table}_uq_{}", unique.join("_"));
        declared.insert(name.clone());

        if !live.contains(&name) {
            let cols = unique
                .iter()
                .map(|f| format!("\"{f}\""))
                .collect::<Vec<_>>()
                .join(", ");
            ops.push(MigrationOp::CreateIndex {
                name: name.clone(),
                sql: format!("CREATE UNIQUE INDEX \"{name}\" ON \"{table}\" ({cols})"),
            });
        }
    }

    for stale in live.difference(&declared) {
        ops.push(MigrationOp::DropIndex {
            name: stale.clone(),
            sql: format!("DROP INDEX \"{stale}\""),
        });
    }

    for child in &et.children {
        child_table_ops(engine, ns, et, child, ops)?;
    }

    Ok(())
}

fn child_table_ops(
    engine: &Engine,
    ns: &Namespace,
    parent: &EntryType,
    child: &ChildEntryType,
    ops: &mut Vec<MigrationOp>,
) -> Result<(), EngineError> {
    let table = ns.table(&child.table);
    let parent_table = ns.table(&parent.table);
    let parent_id_type = match parent.id_mode {
        IdMode::AutoIncrement => ColumnType::Integer,
        IdMode::Ulid | IdMode::Uuid => ColumnType::Text,
    };

    if table_exists(engine, &table)? {
        let existing = live_columns(engine, &table)?;
        for field in &child.fields {
            if !existing.contains(&field.key) {
                let ddl = column_ddl(engine, ns, field);
                ops.push(MigrationOp::AddColumn {
                    table: table.clone(),
                    column: field.key.clone(),
                    sql: format!("ALTER TABLE \"{table}\" ADD COLUMN {ddl}"),
                });
            }
        }

        return Ok(());
    }

    let mut columns = vec![
        "\"id\" TEXT PRIMARY KEY".to_string(),
        format!(
            "\"parent_id\" {} NOT NULL REFERENCES \"{parent_table}\"(\"id\")",
            parent_id_type.sql()
        ),
        "\"position\" INTEGER NOT NULL".to_string(),
    ];
    columns.extend(child.fields.iter().map(|f| column_ddl(engine, ns, f)));

    ops.push(MigrationOp::CreateTable {
        table: table.clone(),
        sql: format!("CREATE TABLE \"{table}\" ({})", columns.join(", ")),
    });

    Ok(())
}

fn settings_table_ops(
    engine: &Engine,
    ns: &Namespace,
    ops: &mut Vec<MigrationOp>,
) -> Result<(), EngineError> {
    let table = ns.settings_table();
    if table_exists(engine, &table)? {
        return Ok(());
    }

    ops.push(MigrationOp::CreateTable {
        table: table.clone(),
        sql: format!(
            "CREATE TABLE \"{table}\" (\
             \"settings_type\" TEXT NOT NULL, \
             \"field\" TEXT NOT NULL, \
             \"value\" TEXT, \
             \"updated_at\" INTEGER NOT NULL, \
             PRIMARY KEY (\"settings_type\", \"field\"))"
        ),
    });

    Ok(())
}

/// Compute the operation list for one namespace without applying anything.
/// A namespace already in step with the declarations yields an empty plan.
pub(crate) fn plan(engine: &Engine, ns: &Namespace) -> Result<Vec<MigrationOp>, EngineError> {
    let scope = match ns {
        Namespace::Global => Scope::Global,
        Namespace::Tenant(_) => Scope::Tenant,
    };

    let mut ops = Vec::new();
    settings_table_ops(engine, ns, &mut ops)?;

    // declared order is stable: relation targets that need to exist first
    // are the author's responsibility only across namespaces, never within
    // one (SQLite resolves forward references at first use)
    for et in engine.schema().entry_types() {
        if et.scope == scope {
            entry_table_ops(engine, ns, et, &mut ops)?;
        }
    }

    Ok(ops)
}

/// Apply the plan, one operation per transaction, and return the
/// human-readable log of applied steps. Safe to re-run: an already-migrated
/// namespace produces no operations.
pub(crate) fn migrate(engine: &Engine, ns: &Namespace) -> Result<Vec<String>, EngineError> {
    let ops = plan(engine, ns)?;
    let mut log = Vec::with_capacity(ops.len());

    for op in ops {
        engine.backend().execute_in_transaction(op.sql())?;

        info!(namespace = %ns, op = %op, "applied migration step");
        log.push(format!("{ns}: {op}"));
    }

    Ok(log)
}
