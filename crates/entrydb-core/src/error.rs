use crate::model::role::Permission;
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// StatusClass
///
/// Outward-facing status classification for recoverable errors. The HTTP
/// layer (an external collaborator) maps these onto response codes.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusClass {
    BadRequest,
    Forbidden,
    NotFound,
    Internal,
}

impl StatusClass {
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

///
/// EngineError
///
/// The engine-wide error taxonomy. Configuration errors are fatal at boot;
/// everything else is recoverable per request and carries a status class.
///

#[derive(Debug, ThisError)]
pub enum EngineError {
    #[error("permission denied: {permission} on {type_name}")]
    PermissionDenied {
        type_name: String,
        permission: Permission,
    },

    #[error("{type_name} not found{}", id.as_deref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        type_name: String,
        id: Option<String>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    ForeignKey(#[from] ForeignKeyError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    #[must_use]
    pub fn permission_denied(type_name: impl Into<String>, permission: Permission) -> Self {
        Self::PermissionDenied {
            type_name: type_name.into(),
            permission,
        }
    }

    #[must_use]
    pub fn not_found(type_name: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            id,
        }
    }

    /// Status classification surfaced to callers.
    #[must_use]
    pub const fn status_class(&self) -> StatusClass {
        match self {
            Self::PermissionDenied { .. } => StatusClass::Forbidden,
            Self::NotFound { .. } => StatusClass::NotFound,
            Self::Validation(_) | Self::Context(_) | Self::ForeignKey(_) => StatusClass::BadRequest,
            Self::Config(_) | Self::Storage(_) => StatusClass::Internal,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

///
/// ValidationError
///
/// Aggregated field-level validation issues. Every offending field is listed
/// in one message; saves never fail fast on the first issue.
///

#[derive(Debug, Default)]
pub struct ValidationError {
    pub issues: BTreeMap<String, Vec<String>>,
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            issues: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.entry(field.into()).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Ok when no issues were collected, the aggregated error otherwise.
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;

        let mut sep = ": ";
        for (field, messages) in &self.issues {
            for message in messages {
                write!(f, "{sep}{field}: {message}")?;
                sep = "; ";
            }
        }

        Ok(())
    }
}

///
/// ConfigError
///
/// Schema-build and process-configuration failures. These indicate a broken
/// declared schema and must stop startup.
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("duplicate type name: {name}")]
    DuplicateTypeName { name: String },

    #[error("invalid identifier '{ident}' in {context}")]
    InvalidIdentifier { context: String, ident: String },

    #[error("{type_name}: duplicate field key: {field}")]
    DuplicateField { type_name: String, field: String },

    #[error("{type_name}: field {field} uses reserved key")]
    ReservedField { type_name: String, field: String },

    #[error("{type_name}.{field}: unknown relation target: {target}")]
    UnknownRelationTarget {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("{type_name}.{field}: display fetch references unknown field {missing}")]
    UnknownDisplayField {
        type_name: String,
        field: String,
        missing: String,
    },

    #[error("{type_name}: unknown field referenced: {field}")]
    UnknownField { type_name: String, field: String },

    #[error("{type_name}.{field}: choice field declared without options")]
    EmptyChoiceOptions { type_name: String, field: String },

    #[error("role {role}: grant references unknown type: {type_name}")]
    UnknownGrantTarget { role: String, type_name: String },

    #[error("role name {role} is reserved")]
    ReservedRole { role: String },

    #[error("role {role}: user scope field {field} does not exist on {type_name}")]
    UnknownScopeField {
        role: String,
        type_name: String,
        field: String,
    },

    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

///
/// ContextError
///
/// Scope-context misuse: binding or routing requests the active context
/// cannot satisfy.
///

#[derive(Debug, ThisError)]
pub enum ContextError {
    #[error("invalid tenant id: {id}")]
    InvalidTenantId { id: String },

    #[error("no tenant bound for tenant-isolated type {type_name}")]
    TenantRequired { type_name: String },

    #[error("tenant binding requires the administrative role, found {role}")]
    TenantBindDenied { role: String },

    #[error("{type_name} is {state}; {operation} is not permitted")]
    InvalidState {
        type_name: String,
        state: String,
        operation: String,
    },
}

///
/// ForeignKeyError
///
/// A storage-level foreign key violation translated into a human-readable
/// message naming the blocking relation.
///

#[derive(Debug, ThisError)]
#[error("foreign key violation: {message}")]
pub struct ForeignKeyError {
    pub relation: String,
    pub message: String,
}

///
/// StorageError
///
/// Unrecognized storage failures pass through unchanged and opaque.
///

#[derive(Debug, ThisError)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage decode error on {table}.{column}: {message}")]
    Decode {
        table: String,
        column: String,
        message: String,
    },
}

///
/// TESTS
///
