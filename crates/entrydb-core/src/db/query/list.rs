use crate::{
    codec::{CodecRegistry, StorageValue},
    db::{
        context::ScopeContext,
        query::filter::{Filter, SqlFragment, render_filter},
        record::ValueMap,
        resolver::ScopedEntryType,
        store::{SqliteBackend, StorageRow},
    },
    error::{EngineError, StorageError, ValidationError},
    model::{SortOrder, role::Permission},
    value::Value,
};
use entrydb_primitives::Timestamp;
use serde::{Deserialize, Serialize};

///
/// ListOptions
///
/// Caller-facing list parameters, camelCase on the wire. Omitting `limit`
/// makes the returned row count the total; supplying it triggers a separate
/// count query.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    pub columns: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub or_filter: Option<Filter>,
    pub order_by: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Free-text search across the type's declared search fields.
    pub search: Option<String>,
}

impl ListOptions {
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

///
/// EntryList
///

#[derive(Clone, Debug, Serialize)]
pub struct EntryList {
    pub rows: Vec<ValueMap>,
    pub total: u64,
}

///
/// AggregateOp
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> EngineError {
    let mut err = ValidationError::new();
    err.add(field, message);

    err.into()
}

///
/// ListQuery
///
/// One list/count/aggregate/batch-update execution against a scoped entry
/// type. Borrowed views only; built fresh per operation.
///

pub(crate) struct ListQuery<'a> {
    pub scoped: &'a ScopedEntryType,
    pub codecs: &'a CodecRegistry,
    pub backend: &'a SqliteBackend,
    pub ctx: &'a ScopeContext,
}

impl ListQuery<'_> {
    fn table(&self) -> Result<String, EngineError> {
        let ns = self
            .ctx
            .namespace_for(self.scoped.decl.scope, &self.scoped.decl.name)?;

        Ok(ns.table(&self.scoped.decl.table))
    }

    fn column_known(&self, column: &str) -> bool {
        column == "id"
            || column == "created_at"
            || column == "updated_at"
            || self.scoped.decl.field_type(column).is_some()
    }

    /// Effective WHERE fragment: caller filter AND or-list AND search AND the
    /// role's row-level scope predicate. The scope predicate is always ANDed
    /// and cannot be bypassed by caller-supplied filters.
    fn where_fragment(&self, opts: &ListOptions) -> Result<SqlFragment, EngineError> {
        let decl = &self.scoped.decl;
        let mut parts: Vec<String> = Vec::new();
        let mut params: Vec<StorageValue> = Vec::new();

        if let Some(filter) = &opts.filter {
            let fragment = render_filter(decl, self.codecs, filter, "AND")?;
            if !fragment.sql.is_empty() {
                parts.push(format!("({})", fragment.sql));
                params.extend(fragment.params);
            }
        }

        if let Some(or_filter) = &opts.or_filter {
            let fragment = render_filter(decl, self.codecs, or_filter, "OR")?;
            if !fragment.sql.is_empty() {
                parts.push(format!("({})", fragment.sql));
                params.extend(fragment.params);
            }
        }

        if let Some(search) = opts.search.as_deref().filter(|s| !s.is_empty()) {
            let mut likes = Vec::new();
            for field in &decl.search_fields {
                likes.push(format!("\"{field}\" LIKE ? ESCAPE '\\'"));
                let escaped = search.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
                params.push(StorageValue::Text(format!("%{escaped}%")));
            }
            if !likes.is_empty() {
                parts.push(format!("({})", likes.join(" OR ")));
            }
        }

        if let Some(scope_field) = &self.scoped.grant.user_scope {
            parts.push(format!("\"{scope_field}\" = ?"));
            params.push(
                self.ctx
                    .user
                    .as_ref()
                    .map_or(StorageValue::Null, |u| StorageValue::Text(u.clone())),
            );
        }

        Ok(SqlFragment {
            sql: parts.join(" AND "),
            params,
        })
    }

    fn effective_columns(&self, opts: &ListOptions) -> Result<Vec<String>, EngineError> {
        let decl = &self.scoped.decl;

        if let Some(requested) = &opts.columns {
            let mut columns = Vec::with_capacity(requested.len() + 1);
            for column in requested {
                if !self.column_known(column) {
                    return Err(invalid(column, "unknown column"));
                }
                if let Some(ft) = decl.field_type(column) {
                    if !self.scoped.field_visible(ft) {
                        return Err(EngineError::permission_denied(&decl.name, Permission::View));
                    }
                }
                columns.push(column.clone());
            }
            if !columns.iter().any(|c| c == "id") {
                columns.insert(0, "id".to_string());
            }

            return Ok(columns);
        }

        if !decl.default_list_fields.is_empty() {
            let mut columns = vec!["id".to_string()];
            columns.extend(decl.default_list_fields.iter().cloned());

            return Ok(columns);
        }

        let mut columns = vec!["id".to_string()];
        columns.extend(
            decl.fields
                .iter()
                .filter(|f| !f.hidden && self.scoped.field_visible(f))
                .map(|f| f.key.clone()),
        );
        columns.push("created_at".to_string());
        columns.push("updated_at".to_string());

        Ok(columns)
    }

    fn order_clause(&self, opts: &ListOptions) -> Result<String, EngineError> {
        let decl = &self.scoped.decl;

        let (field, declared_order) = match (&opts.order_by, &decl.default_sort) {
            (Some(field), _) => (field.clone(), SortOrder::Asc),
            (None, Some((field, order))) => (field.clone(), *order),
            (None, None) => ("id".to_string(), SortOrder::Asc),
        };

        if !self.column_known(&field) {
            return Err(invalid(&field, "unknown sort field"));
        }

        let order = opts.order.unwrap_or(declared_order);

        Ok(format!(" ORDER BY \"{field}\" {}", order.sql()))
    }

    fn decode_row(&self, row: StorageRow) -> Result<ValueMap, EngineError> {
        let decl = &self.scoped.decl;
        let mut out = ValueMap::new();

        for (column, raw) in row {
            let value = match column.as_str() {
                "id" => match raw {
                    StorageValue::Null => Value::Null,
                    StorageValue::Integer(n) => Value::Int(n),
                    StorageValue::Text(s) => Value::Text(s),
                    StorageValue::Real(f) => Value::float(f),
                },
                "created_at" | "updated_at" => match raw {
                    StorageValue::Null => Value::Null,
                    StorageValue::Integer(ms) => Value::Timestamp(Timestamp::from_millis(ms)),
                    other => {
                        return Err(StorageError::Decode {
                            table: decl.table.clone(),
                            column: column.clone(),
                            message: format!("unexpected timestamp shape: {other:?}"),
                        }
                        .into());
                    }
                },
                key => {
                    let Some(ft) = decl.field_type(key) else {
                        // columns the declared field set does not recognize
                        // are skipped, not errors
                        continue;
                    };
                    self.codecs
                        .get(ft.kind)
                        .from_storage(raw, ft)
                        .map_err(|message| StorageError::Decode {
                            table: decl.table.clone(),
                            column: key.to_string(),
                            message,
                        })?
                }
            };
            out.insert(column, value);
        }

        Ok(out)
    }

    pub fn list(&self, opts: &ListOptions) -> Result<EntryList, EngineError> {
        self.scoped.require(Permission::View)?;

        let table = self.table()?;
        let columns = self.effective_columns(opts)?;
        let where_fragment = self.where_fragment(opts)?;
        let order = self.order_clause(opts)?;

        let column_sql = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {column_sql} FROM \"{table}\"");
        if !where_fragment.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_fragment.sql);
        }
        sql.push_str(&order);

        if let Some(limit) = opts.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = opts.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let rows = self.backend.select(&sql, &where_fragment.params)?;
        let mut decoded = Vec::with_capacity(rows.len());
        for row in rows {
            decoded.push(self.decode_row(row)?);
        }

        // a bounded page needs its own count query; an unbounded result is
        // its own total
        let total = if opts.limit.is_some() {
            self.count_where(&table, &where_fragment)?
        } else {
            decoded.len() as u64
        };

        Ok(EntryList {
            rows: decoded,
            total,
        })
    }

    fn count_where(&self, table: &str, fragment: &SqlFragment) -> Result<u64, EngineError> {
        let mut sql = format!("SELECT COUNT(*) FROM \"{table}\"");
        if !fragment.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }

        match self.backend.query_scalar(&sql, &fragment.params)? {
            StorageValue::Integer(n) => Ok(u64::try_from(n).unwrap_or_default()),
            other => Err(StorageError::Decode {
                table: table.to_string(),
                column: "count".to_string(),
                message: format!("unexpected count shape: {other:?}"),
            }
            .into()),
        }
    }

    pub fn count(&self, filter: Option<&Filter>) -> Result<u64, EngineError> {
        self.scoped.require(Permission::View)?;

        let table = self.table()?;
        let opts = ListOptions {
            filter: filter.cloned(),
            ..ListOptions::default()
        };
        let fragment = self.where_fragment(&opts)?;

        self.count_where(&table, &fragment)
    }

    pub fn aggregate(
        &self,
        op: AggregateOp,
        field: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Value, EngineError> {
        self.scoped.require(Permission::View)?;

        let table = self.table()?;
        let opts = ListOptions {
            filter: filter.cloned(),
            ..ListOptions::default()
        };
        let fragment = self.where_fragment(&opts)?;

        let target = match (op, field) {
            (AggregateOp::Count, _) => "*".to_string(),
            (_, Some(field)) => {
                if !self.column_known(field) {
                    return Err(invalid(field, "unknown aggregate field"));
                }
                format!("\"{field}\"")
            }
            (_, None) => return Err(invalid("field", "aggregate requires a field")),
        };

        let mut sql = format!("SELECT {}({target}) FROM \"{table}\"", op.sql());
        if !fragment.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }

        let value = match self.backend.query_scalar(&sql, &fragment.params)? {
            StorageValue::Null => Value::Null,
            StorageValue::Integer(n) => Value::Int(n),
            StorageValue::Real(f) => Value::float(f),
            StorageValue::Text(s) => Value::Text(s),
        };

        Ok(value)
    }

    /// Batch update by filter: writable fields only, unknown and
    /// non-writable keys silently ignored, `updated_at` stamped alongside.
    pub fn batch_update(
        &self,
        filter: Option<&Filter>,
        changes: &ValueMap,
    ) -> Result<u64, EngineError> {
        self.scoped.require(Permission::Modify)?;

        let decl = &self.scoped.decl;
        let table = self.table()?;
        let opts = ListOptions {
            filter: filter.cloned(),
            ..ListOptions::default()
        };
        let fragment = self.where_fragment(&opts)?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        let mut issues = ValidationError::new();

        for (key, raw) in changes {
            let Some(ft) = decl.field_type(key) else {
                continue;
            };
            if !self.scoped.field_writable(ft) {
                continue;
            }

            let codec = self.codecs.get(ft.kind);
            match codec
                .normalize(raw.clone(), ft)
                .and_then(|normalized| codec.to_storage(&normalized, ft))
            {
                Ok(stored) => {
                    sets.push(format!("\"{key}\" = ?"));
                    params.push(stored);
                }
                Err(message) => issues.add(key.clone(), message),
            }
        }
        issues.result()?;

        if sets.is_empty() {
            return Ok(0);
        }

        sets.push("\"updated_at\" = ?".to_string());
        params.push(StorageValue::Integer(Timestamp::now().as_millis()));

        let mut sql = format!("UPDATE \"{table}\" SET {}", sets.join(", "));
        if !fragment.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }
        params.extend(fragment.params);

        let affected = self.backend.execute(&sql, &params)?;

        Ok(affected as u64)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_options_accept_camel_case_wire_shape() {
        let opts: ListOptions = serde_json::from_value(serde_json::json!({
            "columns": ["name"],
            "filter": [{"field": "age", "op": ">=", "value": 18}],
            "orFilter": [{"field": "name", "op": "startsWith", "value": "A"}],
            "orderBy": "name",
            "order": "desc",
            "limit": 10,
            "offset": 20
        }))
        .unwrap();

        assert_eq!(opts.order_by.as_deref(), Some("name"));
        assert_eq!(opts.order, Some(SortOrder::Desc));
        assert_eq!(opts.limit, Some(10));
        assert!(opts.or_filter.is_some());
    }

    #[test]
    fn aggregate_ops_render_sql_names() {
        assert_eq!(AggregateOp::Count.sql(), "COUNT");
        assert_eq!(AggregateOp::Sum.sql(), "SUM");
        assert_eq!(AggregateOp::Avg.sql(), "AVG");
    }
}
