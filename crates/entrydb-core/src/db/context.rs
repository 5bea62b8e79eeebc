use crate::{
    error::ContextError,
    model::{Scope, role::ADMIN_ROLE},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// TenantId
///
/// Validated tenant identifier; doubles as a table-name prefix component, so
/// the identifier alphabet is restricted up front.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContextError> {
        let id = id.into();

        let valid = !id.is_empty()
            && id.len() <= 64
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if valid {
            Ok(Self(id))
        } else {
            Err(ContextError::InvalidTenantId { id })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TenantId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

///
/// Namespace
///
/// One storage namespace: the shared global one, or one per tenant. Every
/// physical table name is the namespace prefix plus the declared base table.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Namespace {
    Global,
    Tenant(TenantId),
}

impl Namespace {
    /// Physical table name for a declared base table in this namespace.
    #[must_use]
    pub fn table(&self, base: &str) -> String {
        match self {
            Self::Global => format!("global_{base}"),
            Self::Tenant(tenant) => format!("t_{tenant}_{base}"),
        }
    }

    /// The sparse settings table for this namespace.
    #[must_use]
    pub fn settings_table(&self) -> String {
        self.table("entry_settings")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Tenant(tenant) => write!(f, "tenant:{tenant}"),
        }
    }
}

///
/// Identity
///
/// An authenticated principal as handed over by the (out-of-scope) auth
/// layer: who they are, which role they act under, which tenant they belong
/// to.
///

#[derive(Clone, Debug)]
pub struct Identity {
    pub user: String,
    pub role: String,
    pub tenant: Option<TenantId>,
}

///
/// ScopeContext
///
/// Immutable request context. All storage routing and permission checks are
/// pure functions of this value plus the target type's scope flag. Deriving
/// a new context rebinds these fields only; the engine itself is never
/// cloned or re-validated.
///

#[derive(Clone, Debug)]
pub struct ScopeContext {
    pub role: String,
    pub tenant: Option<TenantId>,
    pub user: Option<String>,
}

impl ScopeContext {
    /// The boot context: administrative role, no tenant, no user.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            role: ADMIN_ROLE.to_string(),
            tenant: None,
            user: None,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Rebind tenant routing. Administrative privilege only.
    pub fn bind_tenant(&self, tenant: TenantId) -> Result<Self, ContextError> {
        if self.is_admin() {
            Ok(Self {
                role: self.role.clone(),
                tenant: Some(tenant),
                user: self.user.clone(),
            })
        } else {
            Err(ContextError::TenantBindDenied {
                role: self.role.clone(),
            })
        }
    }

    /// Rebind to an authenticated identity: their tenant and their role.
    #[must_use]
    pub fn bind_identity(&self, identity: Identity) -> Self {
        Self {
            role: identity.role,
            tenant: identity.tenant,
            user: Some(identity.user),
        }
    }

    /// Pick the namespace a type with the given scope flag routes to.
    pub fn namespace_for(&self, scope: Scope, type_name: &str) -> Result<Namespace, ContextError> {
        match scope {
            Scope::Global => Ok(Namespace::Global),
            Scope::Tenant => self.tenant.clone().map(Namespace::Tenant).ok_or_else(|| {
                ContextError::TenantRequired {
                    type_name: type_name.to_string(),
                }
            }),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_ids_are_validated() {
        assert!(TenantId::new("acme_corp").is_ok());
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("Acme").is_err());
        assert!(TenantId::new("acme corp").is_err());
        assert!(TenantId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn namespaces_prefix_tables() {
        let global = Namespace::Global;
        assert_eq!(global.table("user"), "global_user");

        let tenant = Namespace::Tenant(TenantId::new("acme").unwrap());
        assert_eq!(tenant.table("user"), "t_acme_user");
        assert_eq!(tenant.settings_table(), "t_acme_entry_settings");
    }

    #[test]
    fn tenant_binding_requires_admin() {
        let ctx = ScopeContext::admin();
        let bound = ctx.bind_tenant(TenantId::new("acme").unwrap()).unwrap();
        assert_eq!(bound.tenant.as_ref().unwrap().as_str(), "acme");

        let member = ctx.bind_identity(Identity {
            user: "u1".into(),
            role: "member".into(),
            tenant: Some(TenantId::new("acme").unwrap()),
        });
        assert!(member.bind_tenant(TenantId::new("other").unwrap()).is_err());
    }

    #[test]
    fn global_scope_routes_globally_regardless_of_tenant() {
        let ctx = ScopeContext::admin()
            .bind_tenant(TenantId::new("acme").unwrap())
            .unwrap();

        assert_eq!(
            ctx.namespace_for(Scope::Global, "currency").unwrap(),
            Namespace::Global
        );
        assert_eq!(
            ctx.namespace_for(Scope::Tenant, "task").unwrap(),
            Namespace::Tenant(TenantId::new("acme").unwrap())
        );
    }

    #[test]
    fn tenant_scope_without_tenant_is_an_error() {
        let ctx = ScopeContext::admin();
        let err = ctx.namespace_for(Scope::Tenant, "task").unwrap_err();
        assert!(matches!(err, ContextError::TenantRequired { .. }), "{err}");
    }
}
