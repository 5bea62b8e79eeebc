//! Relational backend plumbing. The pooled connection is the one genuinely
//! shared, mutable resource in the engine; everything else is read-only
//! after boot.

use crate::{codec::StorageValue, config::DatabaseLocation, error::StorageError};
use rusqlite::{
    Connection, OpenFlags,
    types::{ToSqlOutput, Value as SqlValue, ValueRef},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

/// SQLite extended result code for foreign key constraint failures.
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;

impl rusqlite::ToSql for StorageValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Integer(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Self::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        };

        Ok(out)
    }
}

impl StorageValue {
    fn from_sql_ref(value: ValueRef<'_>) -> Result<Self, rusqlite::types::FromSqlError> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(n) => Ok(Self::Integer(n)),
            ValueRef::Real(f) => Ok(Self::Real(f)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Self::Text(s.to_string()))
                .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(rusqlite::types::FromSqlError::InvalidType),
        }
    }
}

/// A decoded result row: column name to raw storage value.
pub type StorageRow = BTreeMap<String, StorageValue>;

///
/// SqliteBackend
///
/// One shared connection behind a mutex, safe for many in-flight operations
/// each addressing its own storage namespace. Individual statements are the
/// atomicity unit the engine relies on.
///

#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(location: &DatabaseLocation) -> Result<Self, StorageError> {
        let conn = match location {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )?,
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        if matches!(location, DatabaseLocation::File(_)) {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock().expect("connection mutex poisoned");

        f(&conn).map_err(StorageError::Sqlite)
    }

    /// Run a SELECT, returning every row as a column→value map.
    pub fn select(
        &self,
        sql: &str,
        params: &[StorageValue],
    ) -> Result<Vec<StorageRow>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(ToString::to_string)
                .collect();

            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();

            while let Some(row) = rows.next()? {
                let mut decoded = StorageRow::new();
                for (idx, name) in names.iter().enumerate() {
                    let value = StorageValue::from_sql_ref(row.get_ref(idx)?)
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                            idx,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        ))?;
                    decoded.insert(name.clone(), value);
                }
                out.push(decoded);
            }

            Ok(out)
        })
    }

    /// Run one write statement, returning the affected row count.
    pub fn execute(&self, sql: &str, params: &[StorageValue]) -> Result<usize, StorageError> {
        self.with_conn(|conn| conn.execute(sql, rusqlite::params_from_iter(params.iter())))
    }

    /// Run one INSERT and return the generated rowid.
    pub fn insert(&self, sql: &str, params: &[StorageValue]) -> Result<i64, StorageError> {
        self.with_conn(|conn| {
            conn.execute(sql, rusqlite::params_from_iter(params.iter()))?;

            Ok(conn.last_insert_rowid())
        })
    }

    /// Run one DDL/maintenance statement inside its own transaction.
    pub fn execute_in_transaction(&self, sql: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            let txn = conn.unchecked_transaction()?;
            txn.execute_batch(sql)?;
            txn.commit()
        })
    }

    /// Single scalar query, e.g. COUNT(*).
    pub fn query_scalar(
        &self,
        sql: &str,
        params: &[StorageValue],
    ) -> Result<StorageValue, StorageError> {
        let rows = self.select(sql, params)?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().next())
            .unwrap_or(StorageValue::Null))
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

/// Whether a storage error is a foreign key constraint violation, the one
/// recognized class the runtime translates into a domain error.
#[must_use]
pub fn is_foreign_key_violation(err: &StorageError) -> bool {
    match err {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => {
            failure.extended_code == SQLITE_CONSTRAINT_FOREIGNKEY
        }
        _ => false,
    }
}

///
/// TESTS
///
