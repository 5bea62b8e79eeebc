use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The two always-present roles.
pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "default";

///
/// Permission
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Modify,
    Create,
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::View => "view",
            Self::Modify => "modify",
            Self::Create => "create",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

///
/// FieldAccess
///
/// Per-field view/modify override inside one grant.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldAccess {
    pub view: bool,
    pub modify: bool,
}

impl FieldAccess {
    pub const READ_ONLY: Self = Self {
        view: true,
        modify: false,
    };
    pub const NONE: Self = Self {
        view: false,
        modify: false,
    };
}

///
/// TypeGrant
///
/// Effective permission of one role on one entry or settings type.
///

#[derive(Clone, Debug)]
pub struct TypeGrant {
    pub view: bool,
    pub modify: bool,
    pub create: bool,
    pub delete: bool,

    /// Row-level scoping: every list/count query gains an implicit
    /// `field = current user` predicate, ANDed with caller filters.
    pub user_scope: Option<String>,

    /// Per-field overrides; absent fields follow the type's own flags.
    pub field_overrides: BTreeMap<String, FieldAccess>,

    /// When set, only the listed actions are visible to this role.
    pub action_includes: Option<Vec<String>>,

    /// Actions hidden from this role even when public.
    pub action_excludes: Vec<String>,
}

impl TypeGrant {
    #[must_use]
    pub const fn full() -> Self {
        Self {
            view: true,
            modify: true,
            create: true,
            delete: true,
            user_scope: None,
            field_overrides: BTreeMap::new(),
            action_includes: None,
            action_excludes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            view: true,
            modify: false,
            create: false,
            delete: false,
            user_scope: None,
            field_overrides: BTreeMap::new(),
            action_includes: None,
            action_excludes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::View => self.view,
            Permission::Modify => self.modify,
            Permission::Create => self.create,
            Permission::Delete => self.delete,
        }
    }

    #[must_use]
    pub fn user_scoped(mut self, identity_field: impl Into<String>) -> Self {
        self.user_scope = Some(identity_field.into());
        self
    }

    #[must_use]
    pub fn field_override(mut self, field: impl Into<String>, access: FieldAccess) -> Self {
        self.field_overrides.insert(field.into(), access);
        self
    }

    #[must_use]
    pub fn include_action(mut self, key: impl Into<String>) -> Self {
        self.action_includes
            .get_or_insert_with(Vec::new)
            .push(key.into());
        self
    }

    #[must_use]
    pub fn exclude_action(mut self, key: impl Into<String>) -> Self {
        self.action_excludes.push(key.into());
        self
    }
}

///
/// Role
///
/// A declared role: a named map from type name to grant. The `admin` and
/// `default` roles are materialized by the schema builder and may not be
/// declared by hand.
///

#[derive(Clone, Debug)]
pub struct Role {
    pub name: String,
    pub grants: BTreeMap<String, TypeGrant>,
}

impl Role {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grants: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn grant(mut self, type_name: impl Into<String>, grant: TypeGrant) -> Self {
        self.grants.insert(type_name.into(), grant);
        self
    }

    #[must_use]
    pub fn grant_for(&self, type_name: &str) -> Option<&TypeGrant> {
        self.grants.get(type_name)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_grant_allows_everything() {
        let grant = TypeGrant::full();
        for permission in [
            Permission::View,
            Permission::Modify,
            Permission::Create,
            Permission::Delete,
        ] {
            assert!(grant.allows(permission), "full grant must allow {permission}");
        }
    }

    #[test]
    fn read_only_grant_blocks_writes() {
        let grant = TypeGrant::read_only();
        assert!(grant.allows(Permission::View));
        assert!(!grant.allows(Permission::Modify));
        assert!(!grant.allows(Permission::Create));
        assert!(!grant.allows(Permission::Delete));
    }

    #[test]
    fn user_scope_and_overrides_compose() {
        let grant = TypeGrant::full()
            .user_scoped("owner")
            .field_override("salary", FieldAccess::NONE)
            .exclude_action("export");

        assert_eq!(grant.user_scope.as_deref(), Some("owner"));
        assert_eq!(grant.field_overrides.get("salary"), Some(&FieldAccess::NONE));
        assert_eq!(grant.action_excludes, vec!["export".to_string()]);
    }
}
