//! End-to-end engine scenarios: lifecycle, permissions, routing, sync, and
//! migration against an in-memory backend.

use entrydb::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn compute_full_name(scope: &mut HookScope<'_>) -> Result<(), EngineError> {
    let first = scope.get("first_name");
    let last = scope.get("last_name");

    let full = match (first.as_str(), last.as_str()) {
        (Some(f), Some(l)) => format!("{f} {l}"),
        (Some(f), None) => f.to_string(),
        (None, Some(l)) => l.to_string(),
        (None, None) => return Ok(()),
    };
    scope.set("full_name", Value::text(full));

    Ok(())
}

fn schema() -> Schema {
    SchemaBuilder::new()
        .entry_type(
            EntryType::new("user")
                .id_mode(IdMode::Ulid)
                .title("full_name")
                .search(["email", "full_name"])
                .unique(["email"])
                .field(FieldType::new("email", FieldKind::Text).required())
                .field(FieldType::new("first_name", FieldKind::Text))
                .field(FieldType::new("last_name", FieldKind::Text))
                .field(FieldType::new("full_name", FieldKind::Text).read_only())
                .field(FieldType::new("age", FieldKind::Number))
                .hook(HookPhase::BeforeUpdate, Arc::new(compute_full_name)),
        )
        .entry_type(
            EntryType::new("task")
                .field(FieldType::new("name", FieldKind::Text).required())
                .field(FieldType::new("archived", FieldKind::Boolean).default_value(false))
                .field(
                    FieldType::relation("owner", "user").fetch_display("full_name", "owner_name"),
                )
                .field(FieldType::new("owner_name", FieldKind::Text).read_only())
                .action(Action::new(
                    "archive",
                    Arc::new(|target, _params| {
                        target.set_value("archived", Value::Bool(true))?;
                        Ok(json!({"archived": true}))
                    }),
                ))
                .action(
                    Action::new("purge", Arc::new(|_entry, _params| Ok(json!({"purged": true}))))
                        .private(),
                )
                .child(
                    ChildEntryType::new("checklist")
                        .field(FieldType::new("item", FieldKind::Text).required())
                        .field(FieldType::new("done", FieldKind::Boolean).default_value(false)),
                ),
        )
        .entry_type(
            EntryType::new("note")
                .field(FieldType::new("body", FieldKind::Text))
                .field(FieldType::new("owner", FieldKind::Text)),
        )
        .entry_type(
            EntryType::new("currency")
                .scope(Scope::Global)
                .field(FieldType::new("code", FieldKind::Text).required())
                .unique(["code"]),
        )
        .entry_type(
            EntryType::new("audit_log")
                .core_type()
                .field(FieldType::new("message", FieldKind::Text)),
        )
        .settings_type(
            SettingsType::new("mail")
                .field(FieldType::new("smtp_host", FieldKind::Text))
                .field(FieldType::new("smtp_port", FieldKind::Number).default_value(587)),
        )
        .role(Role::new("viewer").grant("task", TypeGrant::read_only()))
        .role(
            Role::new("member")
                .grant("note", TypeGrant::full().user_scoped("owner"))
                .grant("user", TypeGrant::full())
                .grant("task", TypeGrant::full()),
        )
        .build()
        .expect("schema builds")
}

fn engine() -> Arc<Engine> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let engine = Engine::open(schema(), EngineConfig::in_memory()).expect("engine opens");

    engine
        .migrate(&Namespace::Global)
        .expect("global migration");
    for tenant in ["acme", "globex"] {
        let ns = Namespace::Tenant(TenantId::new(tenant).unwrap());
        engine.migrate(&ns).expect("tenant migration");
    }

    engine
}

fn acme(engine: &Arc<Engine>) -> Db {
    engine.context().with_tenant("acme").expect("bind tenant")
}

fn ada_data() -> ValueMap {
    let mut data = ValueMap::new();
    data.insert("first_name".into(), Value::text("Ada"));
    data.insert("last_name".into(), Value::text("Lovelace"));
    data.insert("email".into(), Value::text("ada@example.com"));
    data
}

#[test]
fn create_save_generates_id_per_mode_with_equal_timestamps() {
    let engine = engine();
    let db = acme(&engine);

    // ulid mode
    let user = db.insert_entry("user", ada_data()).unwrap();
    match user.id() {
        EntryId::Text(id) => assert_eq!(id.len(), 26, "ulid ids are 26 chars: {id}"),
        other => panic!("expected textual id, got {other:?}"),
    }
    let created = user.get("created_at").unwrap();
    let updated = user.get("updated_at").unwrap();
    assert!(!created.is_null());
    assert_eq!(created, updated, "first save stamps equal timestamps");

    // auto-increment mode
    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("write report"));
    let task = db.insert_entry("task", data).unwrap();
    assert!(matches!(task.id(), EntryId::Int(_)), "{:?}", task.id());
}

#[test]
fn before_update_hook_runs_on_first_save() {
    let engine = engine();
    let db = acme(&engine);

    let mut user = db.entry("user").unwrap();
    user.create().unwrap();
    user.update(ada_data()).unwrap();
    let report = user.save().unwrap();

    assert!(report.created);
    assert!(report.sync_errors.is_empty());
    assert_eq!(user.get("full_name").unwrap(), Value::text("Ada Lovelace"));

    // the persisted row agrees after re-hydration
    let loaded = db.get_entry("user", user.id().to_string()).unwrap();
    assert_eq!(loaded.get("full_name").unwrap(), Value::text("Ada Lovelace"));
    assert_eq!(loaded.title(), Value::text("Ada Lovelace"));
}

#[test]
fn saving_without_changes_writes_no_columns() {
    let engine = engine();
    let db = acme(&engine);

    let user = db.insert_entry("user", ada_data()).unwrap();
    let id = user.id().to_string();

    let mut reloaded = db.entry("user").unwrap();
    reloaded.load(id.as_str()).unwrap();
    let before = reloaded.get("updated_at").unwrap();

    std::thread::sleep(std::time::Duration::from_millis(5));
    reloaded.save().unwrap();

    assert_eq!(
        reloaded.get("updated_at").unwrap(),
        before,
        "a no-change save must not touch columns"
    );
}

#[test]
fn permission_invariants_per_operation() {
    let engine = engine();
    let db = acme(&engine);

    let task = {
        let mut data = ValueMap::new();
        data.insert("name".into(), Value::text("t1"));
        db.insert_entry("task", data).unwrap()
    };
    let task_id = match task.id() {
        EntryId::Int(n) => *n,
        other => panic!("unexpected id {other:?}"),
    };

    // viewer: view-only grant on task
    let viewer = db.with_identity(Identity {
        user: "v".into(),
        role: "viewer".into(),
        tenant: Some(TenantId::new("acme").unwrap()),
    });

    let mut entry = viewer.entry("task").unwrap();
    entry.load(task_id).unwrap();
    assert!(entry.data().is_ok());

    let mut changes = ValueMap::new();
    changes.insert("name".into(), Value::text("renamed"));
    let err = entry.update(changes).unwrap_err();
    assert_eq!(err.status_class().code(), 403);
    assert!(entry.save().is_err());
    assert!(entry.delete().is_err());
    assert!(entry.create().is_err());

    // viewer has no grant at all on user
    assert!(viewer.entry("user").is_err());
    assert!(viewer.entry_list("user", &ListOptions::default()).is_err());
    assert!(viewer.count("user", None).is_err());
}

#[test]
fn row_scoping_cannot_be_bypassed_by_filters() {
    let engine = engine();
    let db = acme(&engine);

    for (body, owner) in [("a-note", "alice"), ("b-note", "bob")] {
        let mut data = ValueMap::new();
        data.insert("body".into(), Value::text(body));
        data.insert("owner".into(), Value::text(owner));
        db.insert_entry("note", data).unwrap();
    }

    let alice = db.with_identity(Identity {
        user: "alice".into(),
        role: "member".into(),
        tenant: Some(TenantId::new("acme").unwrap()),
    });

    // even a filter asking for bob's rows stays scoped to alice
    let opts = ListOptions::filtered(Filter::new().clause("owner", FilterOp::Eq, "bob"));
    let list = alice.entry_list("note", &opts).unwrap();
    assert!(list.rows.is_empty(), "{:?}", list.rows);

    let all = alice.entry_list("note", &ListOptions::default()).unwrap();
    assert_eq!(all.total, 1);
    assert_eq!(all.rows[0].get("owner"), Some(&Value::text("alice")));
}

#[test]
fn denormalized_display_values_follow_the_source() {
    let engine = engine();
    let db = acme(&engine);

    let user = db.insert_entry("user", ada_data()).unwrap();
    let user_id = user.id().to_string();

    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("review patch"));
    data.insert("owner".into(), Value::text(user_id.clone()));
    let task = db.insert_entry("task", data).unwrap();

    // fetched at save time
    assert_eq!(task.get("owner_name").unwrap(), Value::text("Ada Lovelace"));

    // propagation after the source's title field changes
    let mut loaded = db.entry("user").unwrap();
    loaded.load(user_id.as_str()).unwrap();
    let mut change = ValueMap::new();
    change.insert("last_name".into(), Value::text("Byron"));
    loaded.update(change).unwrap();
    let report = loaded.save().unwrap();
    assert!(report.sync_errors.is_empty(), "{:?}", report.sync_errors);

    let task_after = db
        .get_entry("task", match task.id() {
            EntryId::Int(n) => *n,
            other => panic!("unexpected id {other:?}"),
        })
        .unwrap();
    assert_eq!(task_after.get("owner_name").unwrap(), Value::text("Ada Byron"));
}

#[test]
fn migration_is_idempotent_per_namespace() {
    let engine = engine();

    // the fixture already migrated everything; a second run is empty
    assert!(engine.plan_migration(&Namespace::Global).unwrap().is_empty());
    let ns = Namespace::Tenant(TenantId::new("acme").unwrap());
    assert!(engine.plan_migration(&ns).unwrap().is_empty());
    assert!(engine.migrate(&ns).unwrap().is_empty());
}

#[test]
fn between_filter_is_inclusive() {
    let engine = engine();
    let db = acme(&engine);

    for (email, age) in [
        ("a@example.com", 17),
        ("b@example.com", 18),
        ("c@example.com", 25),
        ("d@example.com", 30),
        ("e@example.com", 31),
    ] {
        let mut data = ValueMap::new();
        data.insert("email".into(), Value::text(email));
        data.insert("age".into(), Value::Int(age));
        db.insert_entry("user", data).unwrap();
    }

    let opts = ListOptions::filtered(Filter::new().clause(
        "age",
        FilterOp::Between,
        Value::List(vec![Value::Int(18), Value::Int(30)]),
    ));
    let list = db.entry_list("user", &opts).unwrap();

    let mut ages: Vec<i64> = list
        .rows
        .iter()
        .filter_map(|row| row.get("age").and_then(Value::as_i64))
        .collect();
    ages.sort_unstable();

    assert_eq!(ages, vec![18, 25, 30]);
    assert_eq!(list.total, 3);
}

#[test]
fn deleting_a_referenced_entry_names_the_blocking_relation() {
    let engine = engine();
    let db = acme(&engine);

    let user = db.insert_entry("user", ada_data()).unwrap();
    let user_id = user.id().to_string();

    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("blocked delete"));
    data.insert("owner".into(), Value::text(user_id.clone()));
    db.insert_entry("task", data).unwrap();

    let mut doomed = db.entry("user").unwrap();
    doomed.load(user_id.as_str()).unwrap();
    let err = doomed.delete().unwrap_err();

    assert_eq!(err.status_class().code(), 400);
    assert!(
        err.to_string().contains("task.owner"),
        "error must name the blocking relation: {err}"
    );

    // the row survives the rejected delete
    assert!(db.get_entry("user", user_id.as_str()).is_ok());
}

#[test]
fn tenants_are_isolated_and_global_types_are_shared() {
    let engine = engine();
    let db_acme = acme(&engine);
    let db_globex = engine.context().with_tenant("globex").unwrap();

    db_acme.insert_entry("user", ada_data()).unwrap();

    assert_eq!(db_acme.count("user", None).unwrap(), 1);
    assert_eq!(db_globex.count("user", None).unwrap(), 0);

    // a global-shared type is visible from every tenant binding
    let mut code = ValueMap::new();
    code.insert("code".into(), Value::text("EUR"));
    db_acme.insert_entry("currency", code).unwrap();

    assert_eq!(db_acme.count("currency", None).unwrap(), 1);
    assert_eq!(db_globex.count("currency", None).unwrap(), 1);
}

#[test]
fn settings_materialize_lazily_and_persist_sparsely() {
    let engine = engine();
    let db = acme(&engine);

    // defaults before any write
    let settings = db.settings("mail").unwrap();
    assert_eq!(settings.get("smtp_port").unwrap(), Value::Int(587));
    assert_eq!(settings.get("smtp_host").unwrap(), Value::Null);

    let mut settings = db.settings("mail").unwrap();
    settings.set("smtp_host", "mail.acme.example").unwrap();
    settings.save().unwrap();

    let reloaded = db.settings("mail").unwrap();
    assert_eq!(
        reloaded.get("smtp_host").unwrap(),
        Value::text("mail.acme.example")
    );
    // untouched fields still read their declared default
    assert_eq!(reloaded.get("smtp_port").unwrap(), Value::Int(587));

    // per-tenant isolation of the singleton
    let other = engine.context().with_tenant("globex").unwrap();
    assert_eq!(other.settings("mail").unwrap().get("smtp_host").unwrap(), Value::Null);
}

#[test]
fn private_actions_stay_server_side() {
    let engine = engine();
    let db = acme(&engine);

    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("actionable"));
    let mut task = db.insert_entry("task", data).unwrap();

    assert_eq!(task.actions(), vec!["archive".to_string()]);

    let out = task.run_action("archive", json!({})).unwrap();
    assert_eq!(out, json!({"archived": true}));
    assert_eq!(task.get("archived").unwrap(), Value::Bool(true));

    let err = task.run_action("purge", json!({})).unwrap_err();
    assert_eq!(err.status_class().code(), 403);

    // server-side surface may still reach it
    assert_eq!(task.invoke_action("purge", json!({})).unwrap(), json!({"purged": true}));
}

#[test]
fn default_role_is_excluded_from_core_types() {
    let engine = engine();
    let db = acme(&engine);

    let member = db.with_identity(Identity {
        user: "m".into(),
        role: "default".into(),
        tenant: Some(TenantId::new("acme").unwrap()),
    });

    // non-core type: accessible
    assert!(member.entry("task").is_ok());

    // core type: no grant
    let err = member.entry("audit_log").unwrap_err();
    assert_eq!(err.status_class().code(), 403);
}

#[test]
fn validation_aggregates_every_offending_field() {
    let engine = engine();
    let db = acme(&engine);

    let mut user = db.entry("user").unwrap();
    user.create().unwrap();
    let mut data = ValueMap::new();
    data.insert("age".into(), Value::text("not-a-number"));
    user.update(data).unwrap();

    let err = user.save().unwrap_err();
    let message = err.to_string();

    assert_eq!(err.status_class().code(), 400);
    assert!(message.contains("email"), "missing required email: {message}");
    assert!(message.contains("age"), "bad number must be listed too: {message}");
}

#[test]
fn unknown_and_readonly_keys_are_silently_ignored() {
    let engine = engine();
    let db = acme(&engine);

    let mut user = db.entry("user").unwrap();
    user.create().unwrap();

    let mut data = ada_data();
    data.insert("ghost_field".into(), Value::text("nope"));
    data.insert("full_name".into(), Value::text("Forged Name"));
    user.update(data).unwrap();
    user.save().unwrap();

    // the hook, not the caller, owns the read-only field
    assert_eq!(user.get("full_name").unwrap(), Value::text("Ada Lovelace"));
    assert_eq!(user.get("ghost_field").unwrap(), Value::Null);
}

#[test]
fn child_collections_replace_on_save_and_die_with_the_parent() {
    let engine = engine();
    let db = acme(&engine);

    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("with checklist"));
    data.insert(
        "checklist".into(),
        Value::from_json(json!([
            {"item": "draft", "done": true},
            {"item": "review"}
        ])),
    );
    let task = db.insert_entry("task", data).unwrap();

    let rows = task.child_list("checklist").unwrap().rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("item"), Some(&Value::text("draft")));
    assert_eq!(rows[0].get("done"), Some(&Value::Bool(true)));

    // an update replaces the whole collection
    let task_id = match task.id() {
        EntryId::Int(n) => *n,
        other => panic!("unexpected id {other:?}"),
    };
    let mut loaded = db.get_entry("task", task_id).unwrap();
    let mut change = ValueMap::new();
    change.insert(
        "checklist".into(),
        Value::from_json(json!([{"item": "ship"}])),
    );
    loaded.update(change).unwrap();
    loaded.save().unwrap();

    let reloaded = db.get_entry("task", task_id).unwrap();
    let rows = reloaded.child_list("checklist").unwrap().rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("item"), Some(&Value::text("ship")));

    // deleting the parent removes its child rows
    let mut doomed = db.get_entry("task", task_id).unwrap();
    doomed.delete().unwrap();
    assert!(db.get_entry("task", task_id).unwrap_err().is_not_found());
}

#[test]
fn child_rows_validate_into_the_aggregated_error() {
    let engine = engine();
    let db = acme(&engine);

    let mut task = db.entry("task").unwrap();
    task.create().unwrap();
    let mut data = ValueMap::new();
    data.insert("name".into(), Value::text("bad children"));
    data.insert("checklist".into(), Value::from_json(json!([{"done": true}])));
    task.update(data).unwrap();

    let err = task.save().unwrap_err();
    assert!(
        err.to_string().contains("checklist.0.item"),
        "child issues carry collection.index.field keys: {err}"
    );
}

#[test]
fn aggregates_and_batch_updates_respect_filters() {
    let engine = engine();
    let db = acme(&engine);

    for (email, age) in [("x@example.com", 20), ("y@example.com", 40), ("z@example.com", 60)] {
        let mut data = ValueMap::new();
        data.insert("email".into(), Value::text(email));
        data.insert("age".into(), Value::Int(age));
        db.insert_entry("user", data).unwrap();
    }

    assert_eq!(
        db.aggregate("user", AggregateOp::Count, None, None).unwrap(),
        Value::Int(3)
    );
    assert_eq!(
        db.aggregate("user", AggregateOp::Sum, Some("age"), None).unwrap(),
        Value::Int(120)
    );
    assert_eq!(
        db.aggregate("user", AggregateOp::Avg, Some("age"), None).unwrap(),
        Value::float(40.0)
    );

    let over_30 = Filter::new().clause("age", FilterOp::Gt, 30i64);
    let mut changes = ValueMap::new();
    changes.insert("first_name".into(), Value::text("Senior"));
    let affected = db
        .update_entry_list("user", Some(&over_30), &changes)
        .unwrap();
    assert_eq!(affected, 2);

    let seniors = Filter::new().clause("first_name", FilterOp::Eq, "Senior");
    assert_eq!(db.count("user", Some(&seniors)).unwrap(), 2);
}

#[test]
fn file_backed_databases_survive_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("entrydb.sqlite");
    let config = EngineConfig {
        database: DatabaseLocation::File(path.clone()),
        default_currency: "USD".to_string(),
    };

    {
        let engine = Engine::open(schema(), config.clone()).unwrap();
        let ns = Namespace::Tenant(TenantId::new("acme").unwrap());
        engine.migrate(&ns).unwrap();

        let db = engine.context().with_tenant("acme").unwrap();
        db.insert_entry("user", ada_data()).unwrap();
    }

    // a fresh engine over the same file sees the migrated schema and rows
    let engine = Engine::open(schema(), config).unwrap();
    let ns = Namespace::Tenant(TenantId::new("acme").unwrap());
    assert!(engine.plan_migration(&ns).unwrap().is_empty());

    let db = engine.context().with_tenant("acme").unwrap();
    assert_eq!(db.count("user", None).unwrap(), 1);
}

#[test]
fn missing_rows_surface_as_not_found() {
    let engine = engine();
    let db = acme(&engine);

    let mut user = db.entry("user").unwrap();
    let err = user.load("01HZZZZZZZZZZZZZZZZZZZZZZZ").unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.status_class().code(), 404);
}
