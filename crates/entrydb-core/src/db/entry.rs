use crate::{
    codec::StorageValue,
    db::{
        Engine,
        child::ChildList,
        context::ScopeContext,
        record::{HookScope, Ledger, ValueMap},
        resolver::ScopedEntryType,
        store::is_foreign_key_violation,
        sync::{self, SyncFailure},
    },
    error::{ContextError, EngineError, ForeignKeyError, StorageError, ValidationError},
    model::{IdMode, Permission, hook::HookPhase},
    value::Value,
};
use entrydb_primitives::Timestamp;
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

///
/// EntryId
///
/// Identity of one entry: the "new" sentinel before the first save, then an
/// integer rowid or a textual ulid/uuid, per the type's id mode.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EntryId {
    New,
    Int(i64),
    Text(String),
}

impl EntryId {
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }

    #[must_use]
    pub fn to_storage(&self) -> StorageValue {
        match self {
            Self::New => StorageValue::Null,
            Self::Int(n) => StorageValue::Integer(*n),
            Self::Text(s) => StorageValue::Text(s.clone()),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::New => Value::Null,
            Self::Int(n) => Value::Int(*n),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntryId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

///
/// LifecycleState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    Unbound,
    New,
    Persisted,
    Deleted,
}

impl LifecycleState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::New => "new",
            Self::Persisted => "persisted",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// SaveReport
///
/// Outcome of one save: whether the row was created, its identity, and any
/// post-commit propagation failures (the row itself is durably saved even
/// when these are present).
///

#[derive(Debug)]
pub struct SaveReport {
    pub created: bool,
    pub id: EntryId,
    pub sync_errors: Vec<SyncFailure>,
}

///
/// Entry
///
/// Runtime instance of one entry type, bound to one identity. Constructed
/// fresh per operation by the resolver; never shared between concurrent
/// requests; holds no state beyond its own in-flight mutation.
///

pub struct Entry {
    engine: Arc<Engine>,
    ctx: ScopeContext,
    scoped: ScopedEntryType,
    state: LifecycleState,
    id: EntryId,
    values: ValueMap,
    ledger: Ledger,
    children: BTreeMap<String, ChildList>,
}

impl Entry {
    pub(crate) fn new(engine: Arc<Engine>, ctx: ScopeContext, scoped: ScopedEntryType) -> Self {
        let children = scoped
            .decl
            .children
            .iter()
            .map(|c| (c.name.clone(), ChildList::new(c.clone())))
            .collect();

        Self {
            engine,
            ctx,
            scoped,
            state: LifecycleState::Unbound,
            id: EntryId::New,
            values: ValueMap::new(),
            ledger: Ledger::new(),
            children,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.scoped.decl.name
    }

    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub const fn id(&self) -> &EntryId {
        &self.id
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.ledger.is_empty() || self.children.values().any(ChildList::is_dirty)
    }

    /// Current value of one field. View permission gates all data access;
    /// per-field overrides deny individually.
    pub fn get(&self, field: &str) -> Result<Value, EngineError> {
        self.scoped.require(Permission::View)?;

        if let Some(ft) = self.scoped.decl.field_type(field) {
            if !self.scoped.field_visible(ft) {
                return Err(EngineError::permission_denied(
                    self.type_name(),
                    Permission::View,
                ));
            }
        }

        Ok(self.values.get(field).cloned().unwrap_or(Value::Null))
    }

    /// Snapshot of the visible, non-hidden field values.
    pub fn data(&self) -> Result<ValueMap, EngineError> {
        self.scoped.require(Permission::View)?;

        let mut out = ValueMap::new();
        for field in &self.scoped.decl.fields {
            if field.hidden || !self.scoped.field_visible(field) {
                continue;
            }
            if let Some(value) = self.values.get(&field.key) {
                out.insert(field.key.clone(), value.clone());
            }
        }
        for key in ["created_at", "updated_at"] {
            if let Some(value) = self.values.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }

        Ok(out)
    }

    /// Human-readable label, per the type's declared title field.
    #[must_use]
    pub fn title(&self) -> Value {
        self.scoped
            .decl
            .title_field
            .as_ref()
            .and_then(|field| self.values.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// One named child collection.
    pub fn child_list(&self, name: &str) -> Result<&ChildList, EngineError> {
        self.scoped.require(Permission::View)?;

        self.children
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("{}.{name}", self.type_name()), None))
    }

    /// Keys of the actions this role may discover. Private actions are
    /// absent regardless of role.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.scoped
            .public_actions()
            .into_iter()
            .map(|a| a.key.clone())
            .collect()
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Fresh, unsaved entry: every non-read-only, non-hidden field takes its
    /// declared default (or null), identity is the "new" sentinel.
    pub fn create(&mut self) -> Result<(), EngineError> {
        self.scoped.require(Permission::Create)?;

        self.values.clear();
        self.ledger.clear();
        for child in self.children.values_mut() {
            child.set_loaded(Vec::new());
        }

        let decl = Arc::clone(&self.scoped.decl);
        for field in &decl.fields {
            if field.read_only || field.hidden {
                continue;
            }
            self.set_internal(&field.key, field.default_or_null());
        }

        self.id = EntryId::New;
        self.state = LifecycleState::New;

        debug!(entry_type = %decl.name, "created entry");

        Ok(())
    }

    /// Hydrate from storage. Clears state and the modification ledger,
    /// decodes every recognized column, then loads the child collections.
    pub fn load(&mut self, id: impl Into<EntryId>) -> Result<(), EngineError> {
        self.scoped.require(Permission::View)?;
        self.load_unchecked(id.into())
    }

    fn load_unchecked(&mut self, id: EntryId) -> Result<(), EngineError> {
        let decl = Arc::clone(&self.scoped.decl);
        let table = self.table_name()?;

        let sql = format!("SELECT * FROM \"{table}\" WHERE \"id\" = ?1");
        let rows = self.engine.backend().select(&sql, &[id.to_storage()])?;

        let Some(row) = rows.into_iter().next() else {
            return Err(EngineError::not_found(&decl.name, Some(id.to_string())));
        };

        self.values.clear();
        self.ledger.clear();

        for (column, raw) in row {
            match column.as_str() {
                "id" => {
                    self.id = match raw {
                        StorageValue::Integer(n) => EntryId::Int(n),
                        StorageValue::Text(s) => EntryId::Text(s),
                        other => {
                            return Err(StorageError::Decode {
                                table: table.clone(),
                                column: "id".to_string(),
                                message: format!("unexpected id shape: {other:?}"),
                            }
                            .into());
                        }
                    };
                }
                "created_at" | "updated_at" => {
                    if let StorageValue::Integer(ms) = raw {
                        self.values
                            .insert(column.clone(), Value::Timestamp(Timestamp::from_millis(ms)));
                    }
                }
                key => {
                    // columns the field set does not recognize are skipped
                    let Some(ft) = decl.field_type(key) else {
                        continue;
                    };
                    let value = self
                        .engine
                        .codecs()
                        .get(ft.kind)
                        .from_storage(raw, ft)
                        .map_err(|message| StorageError::Decode {
                            table: table.clone(),
                            column: key.to_string(),
                            message,
                        })?;
                    self.values.insert(key.to_string(), value);
                }
            }
        }

        self.load_children()?;
        self.state = LifecycleState::Persisted;

        Ok(())
    }

    /// Apply caller data. Child-collection keys delegate to the collection's
    /// own update; unknown and non-writable keys are silently ignored.
    pub fn update(&mut self, data: ValueMap) -> Result<(), EngineError> {
        self.scoped.require(Permission::Modify)?;

        let decl = Arc::clone(&self.scoped.decl);
        for (key, value) in data {
            if let Some(child) = self.children.get_mut(&key) {
                child.update_from(&value)?;
                continue;
            }

            let Some(ft) = decl.field_type(&key) else {
                continue;
            };
            if !self.scoped.field_writable(ft) {
                continue;
            }

            self.set_internal(&key, value);
        }

        Ok(())
    }

    /// Set one field under role permissions.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        self.scoped.require(Permission::Modify)?;

        let decl = Arc::clone(&self.scoped.decl);
        let ft = decl
            .field_type(field)
            .ok_or_else(|| EngineError::not_found(format!("{}.{field}", decl.name), None))?;

        if !self.scoped.field_writable(ft) {
            return Err(EngineError::permission_denied(&decl.name, Permission::Modify));
        }

        self.set_internal(field, value.into());

        Ok(())
    }

    /// Persist the entry: the full hook pipeline, ledger-scoped column
    /// writes, child persistence, post-commit propagation, re-hydration.
    pub fn save(&mut self) -> Result<SaveReport, EngineError> {
        match self.state {
            LifecycleState::Unbound | LifecycleState::Deleted => {
                return Err(ContextError::InvalidState {
                    type_name: self.type_name().to_string(),
                    state: self.state.to_string(),
                    operation: "save".to_string(),
                }
                .into());
            }
            LifecycleState::New | LifecycleState::Persisted => {}
        }

        let is_new = self.state == LifecycleState::New;
        if is_new {
            self.scoped.require(Permission::Create)?;
        }
        self.scoped.require(Permission::Modify)?;

        self.refresh_fetched_fields()?;

        // stamp timestamps only when column writes will happen, so a
        // no-change save stays write-free
        let now = Timestamp::now();
        if is_new {
            self.set_internal("created_at", Value::Timestamp(now));
            self.set_internal("updated_at", Value::Timestamp(now));
        } else if !self.ledger.is_empty() || self.children_dirty() {
            self.set_internal("updated_at", Value::Timestamp(now));
        }

        self.run_hooks(HookPhase::BeforeValidate)?;
        self.validate_fields()?;
        self.run_hooks(HookPhase::Validate)?;
        if is_new {
            self.run_hooks(HookPhase::BeforeCreate)?;
        }
        // every save, new or existing; normalize-on-save hooks rely on this
        self.run_hooks(HookPhase::BeforeUpdate)?;

        // a hook may have dirtied an otherwise clean update
        if !is_new && !self.ledger.is_empty() && !self.ledger.contains("updated_at") {
            self.set_internal("updated_at", Value::Timestamp(now));
        }

        self.backfill_read_only_required();

        let sync_ledger = self.ledger.clone();
        if is_new {
            self.insert_row()?;
        } else if !self.ledger.is_empty() {
            self.update_row()?;
        }

        self.persist_children()?;

        if is_new {
            self.run_hooks(HookPhase::AfterCreate)?;
        } else {
            self.run_hooks(HookPhase::AfterUpdate)?;
        }
        self.state = LifecycleState::Persisted;

        // post-commit, update path only: best-effort display propagation
        let sync_errors = if is_new {
            Vec::new()
        } else {
            sync::propagate(
                self.engine.connections(),
                self.engine.backend(),
                &self.ctx,
                &self.scoped.decl.name,
                &self.id.to_storage(),
                &sync_ledger,
            )
        };

        // computed/trigger-derived columns become visible to the caller
        self.load_unchecked(self.id.clone())?;

        debug!(
            entry_type = %self.scoped.decl.name,
            id = %self.id,
            created = is_new,
            "saved entry"
        );

        Ok(SaveReport {
            created: is_new,
            id: self.id.clone(),
            sync_errors,
        })
    }

    /// Remove the entry and its child rows. Terminal; no soft delete.
    pub fn delete(&mut self) -> Result<(), EngineError> {
        self.scoped.require(Permission::Delete)?;

        if self.state != LifecycleState::Persisted {
            return Err(ContextError::InvalidState {
                type_name: self.type_name().to_string(),
                state: self.state.to_string(),
                operation: "delete".to_string(),
            }
            .into());
        }

        self.run_hooks(HookPhase::BeforeDelete)?;

        let decl = Arc::clone(&self.scoped.decl);
        let ns = self.namespace()?;
        for child in decl.children.iter() {
            let table = ns.table(&child.table);
            let sql = format!("DELETE FROM \"{table}\" WHERE \"parent_id\" = ?1");
            self.engine.backend().execute(&sql, &[self.id.to_storage()])?;
        }

        let table = ns.table(&decl.table);
        let sql = format!("DELETE FROM \"{table}\" WHERE \"id\" = ?1");
        self.engine
            .backend()
            .execute(&sql, &[self.id.to_storage()])
            .map_err(|err| self.translate_delete_error(err))?;

        self.run_hooks(HookPhase::AfterDelete)?;
        self.state = LifecycleState::Deleted;

        debug!(entry_type = %decl.name, id = %self.id, "deleted entry");

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------

    /// Public-surface action invocation: private actions and role-excluded
    /// actions are not callable here.
    pub fn run_action(&mut self, key: &str, params: JsonValue) -> Result<JsonValue, EngineError> {
        let action = self
            .scoped
            .decl
            .find_action(key)
            .ok_or_else(|| EngineError::not_found(format!("{}.{key}", self.type_name()), None))?;

        if !self.scoped.action_visible(action) {
            return Err(EngineError::permission_denied(
                &self.scoped.decl.name,
                Permission::Modify,
            ));
        }

        let handler = Arc::clone(&action.handler);
        handler(self, params)
    }

    /// Server-side action invocation; private actions are callable here.
    pub fn invoke_action(&mut self, key: &str, params: JsonValue) -> Result<JsonValue, EngineError> {
        let action = self
            .scoped
            .decl
            .find_action(key)
            .ok_or_else(|| EngineError::not_found(format!("{}.{key}", self.type_name()), None))?;

        let handler = Arc::clone(&action.handler);
        handler(self, params)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn namespace(&self) -> Result<crate::db::context::Namespace, EngineError> {
        Ok(self
            .ctx
            .namespace_for(self.scoped.decl.scope, &self.scoped.decl.name)?)
    }

    fn table_name(&self) -> Result<String, EngineError> {
        Ok(self.namespace()?.table(&self.scoped.decl.table))
    }

    fn children_dirty(&self) -> bool {
        self.children.values().any(ChildList::is_dirty)
    }

    /// Ledger-recording write without permission gates; lifecycle plumbing
    /// and hooks go through here.
    fn set_internal(&mut self, field: &str, value: impl Into<Value>) {
        let new = value.into();
        let previous = self.values.get(field).cloned().unwrap_or(Value::Null);

        self.ledger.record(field, previous, new.clone());
        self.values.insert(field.to_string(), new);
    }

    fn run_hooks(&mut self, phase: HookPhase) -> Result<(), EngineError> {
        let mut hooks: Vec<crate::model::HookFn> = self
            .scoped
            .decl
            .hooks
            .phase(phase)
            .iter()
            .map(Arc::clone)
            .collect();
        hooks.extend(
            self.engine
                .schema()
                .global_hooks()
                .phase(phase)
                .iter()
                .map(Arc::clone),
        );

        if hooks.is_empty() {
            return Ok(());
        }

        let is_new = self.state == LifecycleState::New;
        let decl = Arc::clone(&self.scoped.decl);

        for hook in hooks {
            let mut scope = HookScope::new(
                &decl.name,
                &mut self.values,
                &mut self.ledger,
                is_new,
                &self.ctx,
            );
            hook(&mut scope)?;
        }

        Ok(())
    }

    /// Refresh denormalized display columns for relation fields changed in
    /// this mutation window.
    fn refresh_fetched_fields(&mut self) -> Result<(), EngineError> {
        let decl = Arc::clone(&self.scoped.decl);

        for field in &decl.fields {
            let Some(relation) = &field.relation else {
                continue;
            };
            let Some(display) = &relation.display else {
                continue;
            };
            if !self.ledger.contains(&field.key) {
                continue;
            }

            let reference = self.values.get(&field.key).cloned().unwrap_or(Value::Null);
            let fetched = if reference.is_null() {
                Value::Null
            } else {
                self.fetch_display_value(&relation.target, &display.source_field, &reference)?
            };

            self.set_internal(&display.into, fetched);
        }

        Ok(())
    }

    fn fetch_display_value(
        &self,
        target_type: &str,
        source_field: &str,
        reference: &Value,
    ) -> Result<Value, EngineError> {
        fetch_display(&self.engine, &self.ctx, target_type, source_field, reference)
    }

    /// Normalize and validate every declared field plus dirty child rows,
    /// aggregating all issues into one error.
    fn validate_fields(&mut self) -> Result<(), EngineError> {
        let decl = Arc::clone(&self.scoped.decl);
        let engine = Arc::clone(&self.engine);
        let mut issues = ValidationError::new();

        for field in &decl.fields {
            let codec = engine.codecs().get(field.kind);
            let raw = self.values.get(&field.key).cloned().unwrap_or(Value::Null);

            let normalized = match codec.normalize(raw.clone(), field) {
                Ok(value) => value,
                Err(message) => {
                    issues.add(field.key.clone(), message);
                    continue;
                }
            };

            if normalized.is_empty_like() {
                if field.required {
                    issues.add(field.key.clone(), "required value is missing");
                }
            } else if let Err(message) = codec.validate(&normalized, field) {
                issues.add(field.key.clone(), message);
            }

            if normalized != raw {
                self.values.insert(field.key.clone(), normalized.clone());
                self.ledger.set_new(&field.key, normalized);
            }
        }

        for child in self.children.values_mut() {
            child.normalize_pending(engine.codecs(), &mut issues);
        }

        issues.result()?;

        Ok(())
    }

    /// Read-only + required fields still empty after hooks are back-filled
    /// from their declared default.
    fn backfill_read_only_required(&mut self) {
        let decl = Arc::clone(&self.scoped.decl);

        for field in &decl.fields {
            if !(field.read_only && field.required) {
                continue;
            }
            let current = self.values.get(&field.key).cloned().unwrap_or(Value::Null);
            if current.is_empty_like() {
                let default = field.default_or_null();
                if !default.is_empty_like() {
                    self.set_internal(&field.key, default);
                }
            }
        }
    }

    fn generate_id(&self) -> Option<String> {
        match self.scoped.decl.id_mode {
            IdMode::AutoIncrement => None,
            IdMode::Ulid => Some(ulid::Ulid::new().to_string()),
            IdMode::Uuid => Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Encode the ledger-scoped column set from the current values.
    fn encode_ledger_columns(&self) -> Result<(Vec<String>, Vec<StorageValue>), EngineError> {
        let decl = &self.scoped.decl;
        let mut columns = Vec::new();
        let mut params = Vec::new();
        let mut issues = ValidationError::new();

        for field in &decl.fields {
            if !self.ledger.contains(&field.key) {
                continue;
            }
            let value = self.values.get(&field.key).cloned().unwrap_or(Value::Null);
            match self
                .engine
                .codecs()
                .get(field.kind)
                .to_storage(&value, field)
            {
                Ok(stored) => {
                    columns.push(field.key.clone());
                    params.push(stored);
                }
                Err(message) => issues.add(field.key.clone(), message),
            }
        }
        issues.result()?;

        for key in ["created_at", "updated_at"] {
            if self.ledger.contains(key) {
                if let Some(Value::Timestamp(ts)) = self.values.get(key) {
                    columns.push(key.to_string());
                    params.push(StorageValue::Integer(ts.as_millis()));
                }
            }
        }

        Ok((columns, params))
    }

    fn insert_row(&mut self) -> Result<(), EngineError> {
        let table = self.table_name()?;
        let (mut columns, mut params) = self.encode_ledger_columns()?;

        if let Some(generated) = self.generate_id() {
            columns.insert(0, "id".to_string());
            params.insert(0, StorageValue::Text(generated.clone()));
            self.id = EntryId::Text(generated);
        }

        let column_sql = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let marks = (1..=params.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!("INSERT INTO \"{table}\" ({column_sql}) VALUES ({marks})");
        let rowid = self
            .engine
            .backend()
            .insert(&sql, &params)
            .map_err(|err| self.translate_write_error(err))?;

        if self.scoped.decl.id_mode == IdMode::AutoIncrement {
            self.id = EntryId::Int(rowid);
        }

        Ok(())
    }

    fn update_row(&mut self) -> Result<(), EngineError> {
        let table = self.table_name()?;
        let (columns, mut params) = self.encode_ledger_columns()?;
        if columns.is_empty() {
            return Ok(());
        }

        let sets = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("\"{c}\" = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let id_mark = params.len() + 1;
        params.push(self.id.to_storage());

        let sql = format!("UPDATE \"{table}\" SET {sets} WHERE \"id\" = ?{id_mark}");
        self.engine
            .backend()
            .execute(&sql, &params)
            .map_err(|err| self.translate_write_error(err))?;

        Ok(())
    }

    fn persist_children(&mut self) -> Result<(), EngineError> {
        let ns = self.namespace()?;
        let engine = Arc::clone(&self.engine);
        let parent_id = self.id.to_storage();

        for child in self.children.values_mut() {
            let Some(pending) = child.pending() else {
                continue;
            };

            let table = ns.table(&child.decl.table);
            let delete_sql = format!("DELETE FROM \"{table}\" WHERE \"parent_id\" = ?1");
            engine.backend().execute(&delete_sql, &[parent_id.clone()])?;

            for (position, row) in pending.iter().enumerate() {
                let mut columns = vec![
                    "id".to_string(),
                    "parent_id".to_string(),
                    "position".to_string(),
                ];
                let mut params = vec![
                    StorageValue::Text(ulid::Ulid::new().to_string()),
                    parent_id.clone(),
                    StorageValue::Integer(position as i64),
                ];

                // denormalized display columns are fetched per row
                let mut fetched = ValueMap::new();
                for field in &child.decl.fields {
                    let Some(relation) = &field.relation else {
                        continue;
                    };
                    let Some(display) = &relation.display else {
                        continue;
                    };
                    let reference = row.get(&field.key).cloned().unwrap_or(Value::Null);
                    let value = if reference.is_null() {
                        Value::Null
                    } else {
                        fetch_display(
                            &engine,
                            &self.ctx,
                            &relation.target,
                            &display.source_field,
                            &reference,
                        )?
                    };
                    fetched.insert(display.into.clone(), value);
                }

                for field in &child.decl.fields {
                    let value = fetched
                        .remove(&field.key)
                        .or_else(|| row.get(&field.key).cloned())
                        .unwrap_or(Value::Null);
                    let stored = engine
                        .codecs()
                        .get(field.kind)
                        .to_storage(&value, field)
                        .map_err(|message| {
                            let mut err = ValidationError::new();
                            err.add(format!("{}.{position}.{}", child.decl.name, field.key), message);
                            EngineError::from(err)
                        })?;
                    columns.push(field.key.clone());
                    params.push(stored);
                }

                let column_sql = columns
                    .iter()
                    .map(|c| format!("\"{c}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                let marks = (1..=params.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!("INSERT INTO \"{table}\" ({column_sql}) VALUES ({marks})");

                engine.backend().insert(&sql, &params)?;
            }

            child.mark_saved();
        }

        Ok(())
    }

    fn load_children(&mut self) -> Result<(), EngineError> {
        let ns = self.namespace()?;
        let engine = Arc::clone(&self.engine);
        let parent_id = self.id.to_storage();

        for child in self.children.values_mut() {
            let table = ns.table(&child.decl.table);
            let sql =
                format!("SELECT * FROM \"{table}\" WHERE \"parent_id\" = ?1 ORDER BY \"position\"");
            let rows = engine.backend().select(&sql, &[parent_id.clone()])?;

            let mut decoded = Vec::with_capacity(rows.len());
            for row in rows {
                let mut out = ValueMap::new();
                for (column, raw) in row {
                    if column == "parent_id" || column == "position" {
                        continue;
                    }
                    if column == "id" {
                        if let StorageValue::Text(s) = raw {
                            out.insert(column, Value::Text(s));
                        }
                        continue;
                    }
                    let Some(ft) = child.decl.field_type(&column) else {
                        continue;
                    };
                    let value = engine
                        .codecs()
                        .get(ft.kind)
                        .from_storage(raw, ft)
                        .map_err(|message| StorageError::Decode {
                            table: table.clone(),
                            column: column.clone(),
                            message,
                        })?;
                    out.insert(column, value);
                }
                decoded.push(out);
            }

            child.set_loaded(decoded);
        }

        Ok(())
    }

    /// Translate a recognized write failure into a domain error naming this
    /// type's relations; unrecognized failures pass through unchanged.
    fn translate_write_error(&self, err: StorageError) -> EngineError {
        if is_foreign_key_violation(&err) {
            let relations: Vec<String> = self
                .scoped
                .decl
                .fields
                .iter()
                .filter_map(|f| {
                    f.relation
                        .as_ref()
                        .map(|r| format!("{} → {}", f.key, r.target))
                })
                .collect();

            return ForeignKeyError {
                relation: relations.join(", "),
                message: format!(
                    "{} references a missing entry ({})",
                    self.type_name(),
                    relations.join(", ")
                ),
            }
            .into();
        }

        err.into()
    }

    fn translate_delete_error(&self, err: StorageError) -> EngineError {
        if is_foreign_key_violation(&err) {
            let sites = self.engine.schema().referenced_by(self.type_name());
            let blockers: Vec<String> = sites
                .iter()
                .map(|s| format!("{}.{}", s.type_name, s.field))
                .collect();

            return ForeignKeyError {
                relation: blockers.join(", "),
                message: format!(
                    "cannot delete {} {}: still referenced by {}",
                    self.type_name(),
                    self.id,
                    blockers.join(", ")
                ),
            }
            .into();
        }

        err.into()
    }
}

/// Look up the referenced entry's display-source value in the namespace the
/// target type routes to. Missing rows read as null; the foreign key, where
/// declared, rejects dangling references at write time instead.
fn fetch_display(
    engine: &Engine,
    ctx: &ScopeContext,
    target_type: &str,
    source_field: &str,
    reference: &Value,
) -> Result<Value, EngineError> {
    let target = engine
        .schema()
        .entry_type(target_type)
        .ok_or_else(|| EngineError::not_found(target_type, None))?;

    let ns = ctx.namespace_for(target.scope, &target.name)?;
    let table = ns.table(&target.table);
    let id_param = match reference {
        Value::Int(n) => StorageValue::Integer(*n),
        Value::Text(s) => StorageValue::Text(s.clone()),
        other => {
            let mut err = ValidationError::new();
            err.add(target_type, format!("not an id: {}", other.type_label()));
            return Err(err.into());
        }
    };

    let sql = format!("SELECT \"{source_field}\" FROM \"{table}\" WHERE \"id\" = ?1");
    let rows = engine.backend().select(&sql, &[id_param])?;

    let Some(row) = rows.into_iter().next() else {
        return Ok(Value::Null);
    };
    let Some(raw) = row.into_values().next() else {
        return Ok(Value::Null);
    };

    let value = target.field_type(source_field).map_or_else(
        || {
            Ok(match raw.clone() {
                StorageValue::Null => Value::Null,
                StorageValue::Integer(n) => Value::Int(n),
                StorageValue::Real(f) => Value::float(f),
                StorageValue::Text(s) => Value::Text(s),
            })
        },
        |ft| engine.codecs().get(ft.kind).from_storage(raw.clone(), ft),
    );

    value.map_err(|message| {
        StorageError::Decode {
            table,
            column: source_field.to_string(),
            message,
        }
        .into()
    })
}

impl crate::model::ActionTarget for Entry {
    fn type_name(&self) -> &str {
        &self.scoped.decl.name
    }

    fn get_value(&self, field: &str) -> Result<Value, EngineError> {
        self.get(field)
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), EngineError> {
        self.set(field, value)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("type", &self.scoped.decl.name)
            .field("state", &self.state)
            .field("id", &self.id)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}
