//! The engine and its context-bound handle: one canonical, read-only engine
//! instance per process; cheap derived contexts per request.

pub mod child;
pub mod context;
pub mod entry;
pub mod migrate;
pub mod query;
pub mod record;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod sync;

use crate::{
    codec::CodecRegistry,
    config::EngineConfig,
    db::{
        context::{Identity, Namespace, ScopeContext, TenantId},
        entry::Entry,
        migrate::MigrationOp,
        query::{AggregateOp, EntryList, Filter, ListOptions},
        query::list::ListQuery,
        record::ValueMap,
        resolver::{resolve_entry_type, resolve_settings_type},
        settings::Settings,
        store::SqliteBackend,
        sync::ConnectionRegistry,
    },
    error::EngineError,
    model::build::Schema,
    value::Value,
};
use std::sync::Arc;
use tracing::info;

///
/// Engine
///
/// The canonical engine instance: frozen schema, codec registry, connection
/// registry, and the storage backend. Built once at process start; every
/// request works through a derived [`Db`] context view, never a clone.
///

#[derive(Debug)]
pub struct Engine {
    schema: Schema,
    codecs: CodecRegistry,
    connections: ConnectionRegistry,
    backend: SqliteBackend,
    config: EngineConfig,
}

impl Engine {
    /// Open the engine over a validated schema. Configuration or storage
    /// failures here are fatal to process startup.
    pub fn open(schema: Schema, config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        let backend = SqliteBackend::open(&config.database)?;
        let codecs = CodecRegistry::bootstrap(&config.default_currency);
        let connections = ConnectionRegistry::build(&schema);

        info!(
            entry_types = schema.entry_types().count(),
            settings_types = schema.settings_types().count(),
            "engine ready"
        );

        Ok(Arc::new(Self {
            schema,
            codecs,
            connections,
            backend,
            config,
        }))
    }

    /// The boot context: administrative role, global routing only.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> Db {
        Db {
            engine: Arc::clone(self),
            ctx: ScopeContext::admin(),
        }
    }

    // migration surface — administrative visibility, per namespace

    /// Compute the migration plan for one namespace; no side effects.
    pub fn plan_migration(&self, ns: &Namespace) -> Result<Vec<MigrationOp>, EngineError> {
        migrate::plan(self, ns)
    }

    /// Apply the migration plan for one namespace; idempotent.
    pub fn migrate(&self, ns: &Namespace) -> Result<Vec<String>, EngineError> {
        migrate::migrate(self, ns)
    }

    // crate-internal accessors

    pub(crate) const fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) const fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub(crate) const fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub(crate) const fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

///
/// Db
///
/// A scope-bound view over the shared engine: `{role, tenant, user}` plus an
/// `Arc` to the one canonical instance. Derivations rebind routing and
/// permission state only; they never re-run setup or duplicate registries.
///

#[derive(Clone, Debug)]
pub struct Db {
    engine: Arc<Engine>,
    ctx: ScopeContext,
}

impl Db {
    #[must_use]
    pub const fn ctx(&self) -> &ScopeContext {
        &self.ctx
    }

    /// Bind tenant routing, under administrative privilege.
    pub fn with_tenant(&self, tenant: &str) -> Result<Self, EngineError> {
        let tenant = TenantId::new(tenant)?;
        let ctx = self.ctx.bind_tenant(tenant)?;

        Ok(Self {
            engine: Arc::clone(&self.engine),
            ctx,
        })
    }

    /// Bind to an authenticated identity: their tenant and role.
    #[must_use]
    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            ctx: self.ctx.bind_identity(identity),
        }
    }

    /// Resolve a fresh entry runtime instance for this context.
    pub fn entry(&self, type_name: &str) -> Result<Entry, EngineError> {
        let scoped = resolve_entry_type(self.engine.schema(), &self.ctx.role, type_name)?;

        Ok(Entry::new(Arc::clone(&self.engine), self.ctx.clone(), scoped))
    }

    /// Resolve and hydrate the settings singleton for this context's scope.
    pub fn settings(&self, type_name: &str) -> Result<Settings, EngineError> {
        let scoped = resolve_settings_type(self.engine.schema(), &self.ctx.role, type_name)?;
        let mut settings = Settings::new(Arc::clone(&self.engine), self.ctx.clone(), scoped);
        settings.load()?;

        Ok(settings)
    }

    /// Create + update + save in one step.
    pub fn insert_entry(&self, type_name: &str, data: ValueMap) -> Result<Entry, EngineError> {
        let mut entry = self.entry(type_name)?;
        entry.create()?;
        entry.update(data)?;
        entry.save()?;

        Ok(entry)
    }

    /// Load one entry by id.
    pub fn get_entry(&self, type_name: &str, id: impl Into<entry::EntryId>) -> Result<Entry, EngineError> {
        let mut entry = self.entry(type_name)?;
        entry.load(id)?;

        Ok(entry)
    }

    fn list_query<'a>(
        &'a self,
        scoped: &'a resolver::ScopedEntryType,
    ) -> ListQuery<'a> {
        ListQuery {
            scoped,
            codecs: self.engine.codecs(),
            backend: self.engine.backend(),
            ctx: &self.ctx,
        }
    }

    /// List rows per the caller's options, under role and row-level scoping.
    pub fn entry_list(&self, type_name: &str, opts: &ListOptions) -> Result<EntryList, EngineError> {
        let scoped = resolve_entry_type(self.engine.schema(), &self.ctx.role, type_name)?;

        self.list_query(&scoped).list(opts)
    }

    /// Count rows matching a filter.
    pub fn count(&self, type_name: &str, filter: Option<&Filter>) -> Result<u64, EngineError> {
        let scoped = resolve_entry_type(self.engine.schema(), &self.ctx.role, type_name)?;

        self.list_query(&scoped).count(filter)
    }

    /// Aggregate over a column.
    pub fn aggregate(
        &self,
        type_name: &str,
        op: AggregateOp,
        field: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Value, EngineError> {
        let scoped = resolve_entry_type(self.engine.schema(), &self.ctx.role, type_name)?;

        self.list_query(&scoped).aggregate(op, field, filter)
    }

    /// Batch update by filter; returns the affected row count.
    pub fn update_entry_list(
        &self,
        type_name: &str,
        filter: Option<&Filter>,
        changes: &ValueMap,
    ) -> Result<u64, EngineError> {
        let scoped = resolve_entry_type(self.engine.schema(), &self.ctx.role, type_name)?;

        self.list_query(&scoped).batch_update(filter, changes)
    }
}
