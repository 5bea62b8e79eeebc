//! Core runtime for entrydb: the declaration model, field-type codecs, the
//! entry/settings lifecycle engine, multi-tenant routing, the query/filter
//! layer, denormalization sync, and migration orchestration.

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod value;

///
/// Prelude
///
/// Domain vocabulary only: declarations, the context types, and the runtime
/// handles a caller composes at startup and per request.
///

pub mod prelude {
    pub use crate::{
        config::{DatabaseLocation, EngineConfig},
        db::{
            Db, Engine,
            context::{Identity, Namespace, ScopeContext, TenantId},
            entry::{Entry, EntryId, LifecycleState, SaveReport},
            query::{AggregateOp, EntryList, Filter, FilterClause, FilterOp, ListOptions},
            record::{HookScope, ValueMap},
            settings::Settings,
        },
        error::{EngineError, StatusClass},
        model::{
            Action, ActionTarget, ChildEntryType, EntryType, FieldAccess, FieldType, HookPhase,
            IdMode, Permission, Role, Schema, SchemaBuilder, Scope, SettingsType, SortOrder,
            TypeGrant,
        },
        value::Value,
    };
    pub use entrydb_primitives::{FieldKind, Timestamp};
}
