use crate::{
    error::ConfigError,
    model::{
        entry::EntryType,
        hook::{HookFn, HookList, HookPhase},
        role::{ADMIN_ROLE, DEFAULT_ROLE, Role, TypeGrant},
        settings::SettingsType,
        validate::validate_declarations,
    },
};
use std::{collections::BTreeMap, sync::Arc};

///
/// SchemaBuilder
///
/// Explicit registration pass during startup composition. Collects every
/// declared type, role, and process-wide hook, validates the whole set once,
/// and produces one immutable [`Schema`]. Nothing mutates after `build`.
///

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entry_types: Vec<EntryType>,
    settings_types: Vec<SettingsType>,
    roles: Vec<Role>,
    global_hooks: HookList,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_types.push(entry_type);
        self
    }

    #[must_use]
    pub fn settings_type(mut self, settings_type: SettingsType) -> Self {
        self.settings_types.push(settings_type);
        self
    }

    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Register a process-wide hook; global hooks run after instance hooks
    /// within each phase.
    #[must_use]
    pub fn global_hook(mut self, phase: HookPhase, hook: HookFn) -> Self {
        self.global_hooks.push(phase, hook);
        self
    }

    /// Validate the declaration set and freeze it. Errors here are fatal to
    /// process startup.
    pub fn build(self) -> Result<Schema, ConfigError> {
        for role in &self.roles {
            if role.name == ADMIN_ROLE || role.name == DEFAULT_ROLE {
                return Err(ConfigError::ReservedRole {
                    role: role.name.clone(),
                });
            }
        }

        validate_declarations(&self.entry_types, &self.settings_types, &self.roles)?;

        let mut roles: BTreeMap<String, Arc<Role>> = self
            .roles
            .into_iter()
            .map(|role| (role.name.clone(), Arc::new(role)))
            .collect();

        // The two always-present roles are materialized, not declared.
        let mut admin = Role::new(ADMIN_ROLE);
        let mut default = Role::new(DEFAULT_ROLE);
        for et in &self.entry_types {
            admin.grants.insert(et.name.clone(), TypeGrant::full());
            if !et.core {
                default.grants.insert(et.name.clone(), TypeGrant::full());
            }
        }
        for st in &self.settings_types {
            admin.grants.insert(st.name.clone(), TypeGrant::full());
            if !st.core {
                default.grants.insert(st.name.clone(), TypeGrant::full());
            }
        }
        roles.insert(admin.name.clone(), Arc::new(admin));
        roles.insert(default.name.clone(), Arc::new(default));

        // Reverse relation index, used to name blocking relations when a
        // foreign key rejects a delete.
        let mut referenced_by: BTreeMap<String, Vec<RelationSite>> = BTreeMap::new();
        for et in &self.entry_types {
            for field in et.relation_fields() {
                let relation = field.relation.as_ref().expect("relation fields carry meta");
                referenced_by
                    .entry(relation.target.clone())
                    .or_default()
                    .push(RelationSite {
                        type_name: et.name.clone(),
                        field: field.key.clone(),
                    });
            }
        }

        Ok(Schema {
            entry_types: self
                .entry_types
                .into_iter()
                .map(|et| (et.name.clone(), Arc::new(et)))
                .collect(),
            settings_types: self
                .settings_types
                .into_iter()
                .map(|st| (st.name.clone(), Arc::new(st)))
                .collect(),
            roles,
            global_hooks: self.global_hooks,
            referenced_by,
        })
    }
}

///
/// RelationSite
///
/// One relation field referencing some target type; the reverse index maps
/// target type name to these.
///

#[derive(Clone, Debug)]
pub struct RelationSite {
    pub type_name: String,
    pub field: String,
}

///
/// Schema
///
/// The frozen declaration set shared by every context for the lifetime of
/// the process.
///

#[derive(Debug)]
pub struct Schema {
    entry_types: BTreeMap<String, Arc<EntryType>>,
    settings_types: BTreeMap<String, Arc<SettingsType>>,
    roles: BTreeMap<String, Arc<Role>>,
    global_hooks: HookList,
    referenced_by: BTreeMap<String, Vec<RelationSite>>,
}

impl Schema {
    #[must_use]
    pub fn entry_type(&self, name: &str) -> Option<&Arc<EntryType>> {
        self.entry_types.get(name)
    }

    #[must_use]
    pub fn settings_type(&self, name: &str) -> Option<&Arc<SettingsType>> {
        self.settings_types.get(name)
    }

    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Arc<Role>> {
        self.roles.get(name)
    }

    pub fn entry_types(&self) -> impl Iterator<Item = &Arc<EntryType>> {
        self.entry_types.values()
    }

    pub fn settings_types(&self) -> impl Iterator<Item = &Arc<SettingsType>> {
        self.settings_types.values()
    }

    #[must_use]
    pub const fn global_hooks(&self) -> &HookList {
        &self.global_hooks
    }

    /// Relation fields across the schema that reference `target`.
    #[must_use]
    pub fn referenced_by(&self, target: &str) -> &[RelationSite] {
        self.referenced_by
            .get(target)
            .map_or(&[], Vec::as_slice)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::FieldType;
    use entrydb_primitives::FieldKind;

    fn schema_with_core_type() -> Schema {
        SchemaBuilder::new()
            .entry_type(
                EntryType::new("audit_log")
                    .core_type()
                    .field(FieldType::new("message", FieldKind::Text)),
            )
            .entry_type(EntryType::new("task").field(FieldType::new("name", FieldKind::Text)))
            .build()
            .expect("schema builds")
    }

    #[test]
    fn admin_is_granted_every_type() {
        let schema = schema_with_core_type();
        let admin = schema.role(ADMIN_ROLE).expect("admin role");

        assert!(admin.grant_for("audit_log").is_some());
        assert!(admin.grant_for("task").is_some());
    }

    #[test]
    fn default_role_excludes_core_types() {
        let schema = schema_with_core_type();
        let default = schema.role(DEFAULT_ROLE).expect("default role");

        assert!(default.grant_for("audit_log").is_none());
        assert!(default.grant_for("task").is_some());
    }

    #[test]
    fn declaring_a_reserved_role_is_fatal() {
        let err = SchemaBuilder::new()
            .role(Role::new("admin"))
            .build()
            .unwrap_err();

        assert!(matches!(err, ConfigError::ReservedRole { .. }), "{err}");
    }

    #[test]
    fn reverse_relation_index_names_referencing_sites() {
        let schema = SchemaBuilder::new()
            .entry_type(EntryType::new("user").field(FieldType::new("email", FieldKind::Text)))
            .entry_type(EntryType::new("task").field(FieldType::relation("owner", "user")))
            .build()
            .expect("schema builds");

        let sites = schema.referenced_by("user");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].type_name, "task");
        assert_eq!(sites[0].field, "owner");
    }
}
