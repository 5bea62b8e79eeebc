use crate::{
    error::ConfigError,
    model::{RESERVED_FIELD_KEYS, child::ChildEntryType, entry::EntryType, field::FieldType,
        role::Role, settings::SettingsType},
};
use entrydb_primitives::FieldKind;
use std::collections::BTreeSet;

/// Lower-case snake identifiers only; doubles as SQL-identifier safety for
/// declared table and column names.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();

    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_identifier(context: &str, ident: &str) -> Result<(), ConfigError> {
    if is_identifier(ident) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            context: context.to_string(),
            ident: ident.to_string(),
        })
    }
}

fn check_fields(type_name: &str, fields: &[FieldType]) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();

    for field in fields {
        check_identifier(&format!("field of {type_name}"), &field.key)?;

        if RESERVED_FIELD_KEYS.contains(&field.key.as_str()) {
            return Err(ConfigError::ReservedField {
                type_name: type_name.to_string(),
                field: field.key.clone(),
            });
        }

        if !seen.insert(field.key.as_str()) {
            return Err(ConfigError::DuplicateField {
                type_name: type_name.to_string(),
                field: field.key.clone(),
            });
        }

        if matches!(field.kind, FieldKind::Choice | FieldKind::MultiChoice)
            && field.options.is_empty()
        {
            return Err(ConfigError::EmptyChoiceOptions {
                type_name: type_name.to_string(),
                field: field.key.clone(),
            });
        }
    }

    Ok(())
}

fn field_exists(fields: &[FieldType], key: &str) -> bool {
    fields.iter().any(|f| f.key == key)
}

fn check_named_fields<'a>(
    type_name: &str,
    fields: &[FieldType],
    named: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    for key in named {
        if !field_exists(fields, key) {
            return Err(ConfigError::UnknownField {
                type_name: type_name.to_string(),
                field: key.to_string(),
            });
        }
    }

    Ok(())
}

/// Relation checks need the full declaration set; runs as a second pass.
fn check_relations(
    type_name: &str,
    fields: &[FieldType],
    entry_types: &[EntryType],
) -> Result<(), ConfigError> {
    for field in fields {
        let Some(relation) = &field.relation else {
            continue;
        };

        let Some(target) = entry_types.iter().find(|et| et.name == relation.target) else {
            return Err(ConfigError::UnknownRelationTarget {
                type_name: type_name.to_string(),
                field: field.key.clone(),
                target: relation.target.clone(),
            });
        };

        if let Some(display) = &relation.display {
            if !field_exists(&target.fields, &display.source_field) {
                return Err(ConfigError::UnknownDisplayField {
                    type_name: type_name.to_string(),
                    field: field.key.clone(),
                    missing: format!("{}.{}", target.name, display.source_field),
                });
            }
            if !field_exists(fields, &display.into) {
                return Err(ConfigError::UnknownDisplayField {
                    type_name: type_name.to_string(),
                    field: field.key.clone(),
                    missing: display.into.clone(),
                });
            }
        }
    }

    Ok(())
}

fn check_child(parent: &EntryType, child: &ChildEntryType) -> Result<(), ConfigError> {
    let child_name = format!("{}.{}", parent.name, child.name);
    check_identifier("child collection", &child.name)?;
    check_identifier(&format!("table of {child_name}"), &child.table)?;

    // child tables carry an engine-managed ordering column
    for field in &child.fields {
        if field.key == "position" {
            return Err(ConfigError::ReservedField {
                type_name: child_name,
                field: field.key.clone(),
            });
        }
    }

    check_fields(&child_name, &child.fields)
}

fn check_entry_type(et: &EntryType) -> Result<(), ConfigError> {
    check_identifier("entry type", &et.name)?;
    check_identifier(&format!("table of {}", et.name), &et.table)?;
    check_fields(&et.name, &et.fields)?;

    check_named_fields(&et.name, &et.fields, et.title_field.as_deref())?;
    check_named_fields(
        &et.name,
        &et.fields,
        et.default_list_fields.iter().map(String::as_str),
    )?;
    check_named_fields(
        &et.name,
        &et.fields,
        et.default_sort.as_ref().map(|(f, _)| f.as_str()),
    )?;
    check_named_fields(&et.name, &et.fields, et.search_fields.iter().map(String::as_str))?;
    check_named_fields(
        &et.name,
        &et.fields,
        et.uniques.iter().flatten().map(String::as_str),
    )?;

    let mut child_names = BTreeSet::new();
    for child in &et.children {
        if !child_names.insert(child.name.as_str()) {
            return Err(ConfigError::DuplicateField {
                type_name: et.name.clone(),
                field: child.name.clone(),
            });
        }
        check_child(et, child)?;
    }

    Ok(())
}

fn check_settings_type(st: &SettingsType) -> Result<(), ConfigError> {
    check_identifier("settings type", &st.name)?;
    check_fields(&st.name, &st.fields)
}

fn check_role(
    role: &Role,
    entry_types: &[EntryType],
    settings_types: &[SettingsType],
) -> Result<(), ConfigError> {
    for (type_name, grant) in &role.grants {
        let entry = entry_types.iter().find(|et| &et.name == type_name);
        let settings = settings_types.iter().find(|st| &st.name == type_name);

        if entry.is_none() && settings.is_none() {
            return Err(ConfigError::UnknownGrantTarget {
                role: role.name.clone(),
                type_name: type_name.clone(),
            });
        }

        if let Some(scope_field) = &grant.user_scope {
            let fields = entry.map(|et| et.fields.as_slice()).unwrap_or_default();
            if !field_exists(fields, scope_field) {
                return Err(ConfigError::UnknownScopeField {
                    role: role.name.clone(),
                    type_name: type_name.clone(),
                    field: scope_field.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Full declaration-set validation. Any failure here is fatal to boot.
pub(crate) fn validate_declarations(
    entry_types: &[EntryType],
    settings_types: &[SettingsType],
    roles: &[Role],
) -> Result<(), ConfigError> {
    let mut names = BTreeSet::new();
    let mut tables = BTreeSet::new();

    for et in entry_types {
        if !names.insert(et.name.as_str()) {
            return Err(ConfigError::DuplicateTypeName {
                name: et.name.clone(),
            });
        }
        check_entry_type(et)?;

        if !tables.insert(et.table.as_str()) {
            return Err(ConfigError::DuplicateTypeName {
                name: et.table.clone(),
            });
        }
        for child in &et.children {
            if !tables.insert(child.table.as_str()) {
                return Err(ConfigError::DuplicateTypeName {
                    name: child.table.clone(),
                });
            }
        }
    }

    for st in settings_types {
        if !names.insert(st.name.as_str()) {
            return Err(ConfigError::DuplicateTypeName {
                name: st.name.clone(),
            });
        }
        check_settings_type(st)?;
    }

    // second pass: cross-type references
    for et in entry_types {
        check_relations(&et.name, &et.fields, entry_types)?;
        for child in &et.children {
            check_relations(
                &format!("{}.{}", et.name, child.name),
                &child.fields,
                entry_types,
            )?;
        }
    }

    for role in roles {
        check_role(role, entry_types, settings_types)?;
    }

    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::TypeGrant;

    fn user_type() -> EntryType {
        EntryType::new("user")
            .field(FieldType::new("email", FieldKind::Text).required())
            .field(FieldType::new("full_name", FieldKind::Text))
    }

    #[test]
    fn accepts_a_well_formed_declaration_set() {
        let invoice = EntryType::new("invoice")
            .field(FieldType::relation("customer", "user").fetch_display("full_name", "customer_name"))
            .field(FieldType::new("customer_name", FieldKind::Text).read_only());

        assert!(validate_declarations(&[user_type(), invoice], &[], &[]).is_ok());
    }

    #[test]
    fn rejects_unknown_relation_target() {
        let invoice = EntryType::new("invoice").field(FieldType::relation("customer", "ghost"));

        let err = validate_declarations(&[invoice], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRelationTarget { .. }), "{err}");
    }

    #[test]
    fn rejects_display_fetch_into_undeclared_column() {
        let invoice = EntryType::new("invoice")
            .field(FieldType::relation("customer", "user").fetch_display("full_name", "customer_name"));

        let err = validate_declarations(&[user_type(), invoice], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDisplayField { .. }), "{err}");
    }

    #[test]
    fn rejects_reserved_field_keys() {
        let bad = EntryType::new("thing").field(FieldType::new("id", FieldKind::Text));

        let err = validate_declarations(&[bad], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedField { .. }), "{err}");
    }

    #[test]
    fn rejects_choice_without_options() {
        let bad = EntryType::new("ticket").field(FieldType::new("status", FieldKind::Choice));

        let err = validate_declarations(&[bad], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyChoiceOptions { .. }), "{err}");
    }

    #[test]
    fn rejects_role_granting_unknown_type() {
        let role = Role::new("clerk").grant("ghost", TypeGrant::read_only());

        let err = validate_declarations(&[user_type()], &[], &[role]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGrantTarget { .. }), "{err}");
    }

    #[test]
    fn rejects_bad_identifiers() {
        let bad = EntryType::new("User");
        let err = validate_declarations(&[bad], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier { .. }), "{err}");
    }

    #[test]
    fn rejects_child_field_named_position() {
        let bad = EntryType::new("invoice").child(
            ChildEntryType::new("lines").field(FieldType::new("position", FieldKind::Number)),
        );

        let err = validate_declarations(&[bad], &[], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedField { .. }), "{err}");
    }

    #[test]
    fn rejects_user_scope_field_missing_from_type() {
        let role = Role::new("member").grant("user", TypeGrant::full().user_scoped("owner"));

        let err = validate_declarations(&[user_type()], &[], &[role]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScopeField { .. }), "{err}");
    }
}
