//! Role/Permission resolution: pure functions over the immutable declaration
//! tables. No mutable aliasing, no cloned engines; a resolved type is the
//! declared `Arc` plus the effective grant for one role.

use crate::{
    error::EngineError,
    model::{
        action::Action,
        build::Schema,
        entry::EntryType,
        field::FieldType,
        role::{Permission, TypeGrant},
        settings::SettingsType,
    },
};
use std::sync::Arc;

///
/// ScopedEntryType
///
/// An entry type as one role sees it: the shared declaration plus the
/// role's effective grant. Constructed per resolution; cheap to clone.
///

#[derive(Clone, Debug)]
pub struct ScopedEntryType {
    pub decl: Arc<EntryType>,
    pub grant: TypeGrant,
}

impl ScopedEntryType {
    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        self.grant.allows(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), EngineError> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(EngineError::permission_denied(&self.decl.name, permission))
        }
    }

    /// Whether this role may read the field at all.
    #[must_use]
    pub fn field_visible(&self, field: &FieldType) -> bool {
        self.grant
            .field_overrides
            .get(&field.key)
            .is_none_or(|access| access.view)
    }

    /// Whether this role may write the field. Read-only fields are never
    /// caller-writable; hooks bypass this by design.
    #[must_use]
    pub fn field_writable(&self, field: &FieldType) -> bool {
        !field.read_only
            && self
                .grant
                .field_overrides
                .get(&field.key)
                .is_none_or(|access| access.modify)
    }

    /// Whether this role may discover and call the action through the
    /// public surface. Private actions are never visible, regardless of
    /// role; the grant's include list (when set) and excludes apply on top.
    #[must_use]
    pub fn action_visible(&self, action: &Action) -> bool {
        action_visible(&self.grant, action)
    }

    /// Public action list: private actions are never exposed here.
    #[must_use]
    pub fn public_actions(&self) -> Vec<&Action> {
        self.decl
            .actions
            .iter()
            .filter(|a| self.action_visible(a))
            .collect()
    }
}

///
/// ScopedSettingsType
///

#[derive(Clone, Debug)]
pub struct ScopedSettingsType {
    pub decl: Arc<SettingsType>,
    pub grant: TypeGrant,
}

impl ScopedSettingsType {
    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        self.grant.allows(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), EngineError> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(EngineError::permission_denied(&self.decl.name, permission))
        }
    }

    #[must_use]
    pub fn field_visible(&self, field: &FieldType) -> bool {
        self.grant
            .field_overrides
            .get(&field.key)
            .is_none_or(|access| access.view)
    }

    #[must_use]
    pub fn field_writable(&self, field: &FieldType) -> bool {
        !field.read_only
            && self
                .grant
                .field_overrides
                .get(&field.key)
                .is_none_or(|access| access.modify)
    }

    #[must_use]
    pub fn action_visible(&self, action: &Action) -> bool {
        action_visible(&self.grant, action)
    }
}

fn action_visible(grant: &TypeGrant, action: &Action) -> bool {
    !action.private
        && grant
            .action_includes
            .as_ref()
            .is_none_or(|included| included.iter().any(|k| k == &action.key))
        && !grant.action_excludes.iter().any(|x| x == &action.key)
}

fn role_grant<'a>(
    schema: &'a Schema,
    role: &str,
    type_name: &str,
) -> Result<&'a TypeGrant, EngineError> {
    let role_decl = schema
        .role(role)
        .ok_or_else(|| EngineError::permission_denied(type_name, Permission::View))?;

    role_decl
        .grant_for(type_name)
        .ok_or_else(|| EngineError::permission_denied(type_name, Permission::View))
}

/// Resolve an entry type under a role. Unknown type names are 404-class;
/// a role without any grant on the type is 403-class.
pub fn resolve_entry_type(
    schema: &Schema,
    role: &str,
    name: &str,
) -> Result<ScopedEntryType, EngineError> {
    let decl = schema
        .entry_type(name)
        .ok_or_else(|| EngineError::not_found(name, None))?;

    let grant = role_grant(schema, role, name)?;

    Ok(ScopedEntryType {
        decl: Arc::clone(decl),
        grant: grant.clone(),
    })
}

/// Resolve a settings type under a role.
pub fn resolve_settings_type(
    schema: &Schema,
    role: &str,
    name: &str,
) -> Result<ScopedSettingsType, EngineError> {
    let decl = schema
        .settings_type(name)
        .ok_or_else(|| EngineError::not_found(name, None))?;

    let grant = role_grant(schema, role, name)?;

    Ok(ScopedSettingsType {
        decl: Arc::clone(decl),
        grant: grant.clone(),
    })
}

///
/// ScopeGroups
///
/// The types one role can see, partitioned by scope flag. Query routing
/// picks the storage namespace from the type's group membership plus the
/// active context.
///

#[derive(Clone, Debug, Default)]
pub struct ScopeGroups {
    pub global: Vec<String>,
    pub tenant: Vec<String>,
}

/// Partition the role's visible entry and settings types into the
/// global-shared and tenant-isolated groups.
pub fn role_scope_groups(schema: &Schema, role: &str) -> Result<ScopeGroups, EngineError> {
    let role_decl = schema
        .role(role)
        .ok_or_else(|| EngineError::permission_denied(role, Permission::View))?;

    let mut groups = ScopeGroups::default();
    for et in schema.entry_types() {
        if role_decl.grant_for(&et.name).is_some_and(|g| g.allows(Permission::View)) {
            match et.scope {
                crate::model::Scope::Global => groups.global.push(et.name.clone()),
                crate::model::Scope::Tenant => groups.tenant.push(et.name.clone()),
            }
        }
    }
    for st in schema.settings_types() {
        if role_decl.grant_for(&st.name).is_some_and(|g| g.allows(Permission::View)) {
            match st.scope {
                crate::model::Scope::Global => groups.global.push(st.name.clone()),
                crate::model::Scope::Tenant => groups.tenant.push(st.name.clone()),
            }
        }
    }

    Ok(groups)
}

///
/// TESTS
///
