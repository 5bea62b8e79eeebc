use crate::{
    codec::StorageValue,
    db::{
        Engine,
        context::ScopeContext,
        record::{HookScope, Ledger, ValueMap},
        resolver::ScopedSettingsType,
    },
    error::{EngineError, ValidationError},
    model::{Permission, hook::HookPhase},
    value::Value,
};
use entrydb_primitives::Timestamp;
use std::sync::Arc;
use tracing::debug;

///
/// Settings
///
/// Runtime handle for one singleton configuration object in one scope. It
/// always exists implicitly: reads see declared defaults until the first
/// write materializes sparse field-rows. Same ledger discipline as an entry,
/// no create/delete lifecycle.
///

pub struct Settings {
    engine: Arc<Engine>,
    ctx: ScopeContext,
    scoped: ScopedSettingsType,
    values: ValueMap,
    ledger: Ledger,
    loaded: bool,
}

impl Settings {
    pub(crate) fn new(engine: Arc<Engine>, ctx: ScopeContext, scoped: ScopedSettingsType) -> Self {
        Self {
            engine,
            ctx,
            scoped,
            values: ValueMap::new(),
            ledger: Ledger::new(),
            loaded: false,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.scoped.decl.name
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.ledger.is_empty()
    }

    fn settings_table(&self) -> Result<String, EngineError> {
        let ns = self
            .ctx
            .namespace_for(self.scoped.decl.scope, &self.scoped.decl.name)?;

        Ok(ns.settings_table())
    }

    /// Hydrate: declared defaults overlaid with whatever sparse rows exist.
    pub fn load(&mut self) -> Result<(), EngineError> {
        self.scoped.require(Permission::View)?;

        let decl = Arc::clone(&self.scoped.decl);
        let table = self.settings_table()?;

        self.values.clear();
        self.ledger.clear();

        for field in &decl.fields {
            self.values
                .insert(field.key.clone(), field.default_or_null());
        }

        let sql = format!(
            "SELECT \"field\", \"value\" FROM \"{table}\" WHERE \"settings_type\" = ?1"
        );
        let rows = self
            .engine
            .backend()
            .select(&sql, &[StorageValue::Text(decl.name.clone())])?;

        for row in rows {
            let Some(StorageValue::Text(field)) = row.get("field").cloned() else {
                continue;
            };
            let Some(ft) = decl.field_type(&field) else {
                continue;
            };

            let value = match row.get("value") {
                Some(StorageValue::Text(json)) => {
                    let parsed: serde_json::Value = serde_json::from_str(json)
                        .map_err(|e| {
                            let mut err = ValidationError::new();
                            err.add(field.clone(), format!("stored value decode: {e}"));
                            EngineError::from(err)
                        })?;
                    let codec = self.engine.codecs().get(ft.kind);
                    codec
                        .normalize(Value::from_json(parsed), ft)
                        .unwrap_or(Value::Null)
                }
                _ => Value::Null,
            };

            self.values.insert(field, value);
        }

        self.loaded = true;

        Ok(())
    }

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

        Ok(out)
    }

    /// Apply caller data; unknown and non-writable keys are silently ignored.
    pub fn update(&mut self, data: ValueMap) -> Result<(), EngineError> {
        self.scoped.require(Permission::Modify)?;

        let decl = Arc::clone(&self.scoped.decl);
        for (key, value) in data {
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

    /// Persist the changed fields as sparse rows. First write materializes
    /// the singleton; hook order matches the entry save pipeline minus the
    /// create phases.
    pub fn save(&mut self) -> Result<(), EngineError> {
        self.scoped.require(Permission::Modify)?;

        self.run_hooks(HookPhase::BeforeValidate)?;
        self.validate_fields()?;
        self.run_hooks(HookPhase::Validate)?;
        self.run_hooks(HookPhase::BeforeUpdate)?;

        if self.ledger.is_empty() {
            return Ok(());
        }

        let decl = Arc::clone(&self.scoped.decl);
        let table = self.settings_table()?;
        let now = Timestamp::now().as_millis();

        let sql = format!(
            "INSERT INTO \"{table}\" (\"settings_type\", \"field\", \"value\", \"updated_at\") \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(\"settings_type\", \"field\") \
             DO UPDATE SET \"value\" = excluded.\"value\", \"updated_at\" = excluded.\"updated_at\""
        );

        let changed: Vec<String> = self.ledger.fields().cloned().collect();
        for field in changed {
            let value = self.values.get(&field).cloned().unwrap_or(Value::Null);
            let stored = if value.is_null() {
                StorageValue::Null
            } else {
                StorageValue::Text(value.to_json().to_string())
            };

            self.engine.backend().execute(
                &sql,
                &[
                    StorageValue::Text(decl.name.clone()),
                    StorageValue::Text(field),
                    stored,
                    StorageValue::Integer(now),
                ],
            )?;
        }

        self.run_hooks(HookPhase::AfterUpdate)?;
        self.ledger.clear();
        self.loaded = true;

        debug!(settings_type = %decl.name, "saved settings");

        Ok(())
    }

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

        let decl = Arc::clone(&self.scoped.decl);
        let is_new = !self.loaded;

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
                if field.required && self.ledger.contains(&field.key) {
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

        issues.result()?;

        Ok(())
    }
}

impl Settings {
    /// Public-surface action invocation; private actions are not callable
    /// here.
    pub fn run_action(
        &mut self,
        key: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
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
    pub fn invoke_action(
        &mut self,
        key: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let action = self
            .scoped
            .decl
            .find_action(key)
            .ok_or_else(|| EngineError::not_found(format!("{}.{key}", self.type_name()), None))?;

        let handler = Arc::clone(&action.handler);
        handler(self, params)
    }
}

impl crate::model::ActionTarget for Settings {
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

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("type", &self.scoped.decl.name)
            .field("loaded", &self.loaded)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}
