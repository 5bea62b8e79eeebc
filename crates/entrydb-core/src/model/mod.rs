//! Schema declaration model: immutable descriptors for entry types, settings
//! types, fields, hooks, actions, and roles, plus the builder and validation
//! pass that produce one shared [`Schema`](build::Schema) at process start.

pub mod action;
pub mod build;
pub mod child;
pub mod entry;
pub mod field;
pub mod hook;
pub mod role;
pub mod settings;
pub mod validate;

use serde::{Deserialize, Serialize};

// re-exports
pub use action::{Action, ActionFn, ActionTarget};
pub use build::{RelationSite, Schema, SchemaBuilder};
pub use child::ChildEntryType;
pub use entry::EntryType;
pub use field::{DisplayFetch, FieldType, RelationMeta};
pub use hook::{HookFn, HookList, HookPhase};
pub use role::{ADMIN_ROLE, DEFAULT_ROLE, FieldAccess, Permission, Role, TypeGrant};
pub use settings::SettingsType;

///
/// Scope
///
/// Storage routing flag. Tenant-isolated types route to a per-tenant
/// namespace; global-shared types always route to the one shared namespace.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    #[default]
    Tenant,
    Global,
}

///
/// IdMode
///
/// How identity values are produced for new rows of an entry type.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdMode {
    #[default]
    AutoIncrement,
    Ulid,
    Uuid,
}

impl IdMode {
    /// Whether generated ids are textual (ulid/uuid) rather than rowids.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        !matches!(self, Self::AutoIncrement)
    }
}

///
/// SortOrder
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Column keys managed by the engine itself; declared fields may not use them.
pub const RESERVED_FIELD_KEYS: &[&str] = &["id", "created_at", "updated_at", "parent_id"];
