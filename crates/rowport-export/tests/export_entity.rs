use rowport_core::{EntitySchema, FieldValue, Filter, Record, SortSpec, StaticRegistry, TenantScope};
use rowport_export::{ExportError, ExportRequest, export_entity};
use rowport_store::MemoryStore;
use serde_json::json;

fn registry() -> StaticRegistry {
    let assets: EntitySchema = serde_json::from_value(json!({
        "entity": "assets",
        "table_name": "assets",
        "max_export_rows": 3,
        "default_sort": {"field": "tag"},
        "fields": [
            {"name": "tag", "label": "Asset Tag", "kind": {"type": "text"}, "unique": true},
            {"name": "status", "kind": {"type": "enum", "values": ["active", "retired"]}},
            {"name": "cost", "kind": {"type": "number", "scale": 2}},
            {"name": "serial", "kind": {"type": "text"}, "sensitive": true}
        ]
    }))
    .expect("assets schema");
    let unbounded: EntitySchema = serde_json::from_value(json!({
        "entity": "notes",
        "table_name": "notes",
        "max_export_rows": usize::MAX,
        "fields": [{"name": "body", "kind": {"type": "text"}}]
    }))
    .expect("notes schema");
    let audit: EntitySchema = serde_json::from_value(json!({
        "entity": "audit_log",
        "table_name": "audit_log",
        "export_enabled": false,
        "fields": [{"name": "message", "kind": {"type": "text"}}]
    }))
    .expect("audit schema");
    StaticRegistry::from_schemas(vec![assets, audit, unbounded]).expect("registry")
}

fn seed(store: &MemoryStore, org: &str, tag: &str, status: &str, cost: f64) {
    let mut record = Record::new();
    record.insert("tag".to_string(), tag.into());
    record.insert("status".to_string(), status.into());
    record.insert("cost".to_string(), FieldValue::Number(cost));
    store
        .seed(&TenantScope::new(org), "assets", record)
        .expect("seed");
}

#[tokio::test]
async fn export_is_cut_at_entity_cap() {
    let store = MemoryStore::new();
    for (idx, tag) in ["A-5", "A-4", "A-3", "A-2", "A-1"].iter().enumerate() {
        seed(&store, "acme", tag, "active", idx as f64);
    }

    let mut request = ExportRequest::new("acme");
    request.limit = Some(50);
    let output = export_entity(&store, &registry(), "assets", &request)
        .await
        .expect("export");

    assert_eq!(output.row_count, 3);
    assert!(output.truncated);
    let lines: Vec<&str> = output.csv.trim_start_matches('\u{feff}').lines().collect();
    assert_eq!(lines[0], "Asset Tag,status,cost");
    assert_eq!(lines[1], "A-1,active,4.00");
    assert_eq!(lines.len(), 4);
    assert!(output.filename.starts_with("assets_export_"));
    assert!(output.filename.ends_with(".csv"));
    assert_eq!(
        output.content_disposition,
        format!("attachment; filename=\"{}\"", output.filename)
    );
}

#[tokio::test]
async fn smaller_limit_is_not_reported_as_truncated() {
    let store = MemoryStore::new();
    for tag in ["A-1", "A-2", "A-3"] {
        seed(&store, "acme", tag, "active", 1.0);
    }

    let mut request = ExportRequest::new("acme");
    request.limit = Some(2);
    let output = export_entity(&store, &registry(), "assets", &request)
        .await
        .expect("export");
    assert_eq!(output.row_count, 2);
    assert!(!output.truncated);
}

#[tokio::test]
async fn export_only_sees_the_callers_tenant_and_filters() {
    let store = MemoryStore::new();
    seed(&store, "acme", "A-1", "active", 1.0);
    seed(&store, "acme", "A-2", "retired", 2.0);
    seed(&store, "globex", "G-1", "active", 3.0);

    let mut request = ExportRequest::new("acme");
    request.fields = Some(vec!["tag".to_string()]);
    request.filters = vec![Filter {
        field: "status".to_string(),
        value: "active".into(),
    }];
    let output = export_entity(&store, &registry(), "assets", &request)
        .await
        .expect("export");

    assert_eq!(output.row_count, 1);
    assert!(!output.truncated);
    assert!(output.csv.ends_with("Asset Tag\nA-1\n"));
}

#[tokio::test]
async fn disabled_and_unknown_entities_are_rejected() {
    let store = MemoryStore::new();
    let request = ExportRequest::new("acme");

    let err = export_entity(&store, &registry(), "audit_log", &request)
        .await
        .expect_err("disabled");
    assert!(matches!(err, ExportError::ExportDisabled(_)));

    let err = export_entity(&store, &registry(), "ghosts", &request)
        .await
        .expect_err("unknown");
    assert!(matches!(err, ExportError::EntityNotFound(_)));
}

#[tokio::test]
async fn blank_organization_is_rejected() {
    let store = MemoryStore::new();
    seed(&store, "", "A-1", "active", 1.0);

    for org in ["", "   "] {
        let err = export_entity(&store, &registry(), "assets", &ExportRequest::new(org))
            .await
            .expect_err("blank tenant");
        assert!(matches!(err, ExportError::MissingTenant));
    }
}

#[tokio::test]
async fn sorting_by_a_sensitive_field_is_rejected() {
    let store = MemoryStore::new();
    let mut request = ExportRequest::new("acme");
    request.sort = Some(SortSpec {
        field: "serial".to_string(),
        descending: false,
    });

    let err = export_entity(&store, &registry(), "assets", &request)
        .await
        .expect_err("sensitive sort");
    assert!(matches!(err, ExportError::UnknownField { field, .. } if field == "serial"));
}

#[tokio::test]
async fn unbounded_cap_exports_everything() {
    let store = MemoryStore::new();
    for body in ["first", "second"] {
        let mut record = Record::new();
        record.insert("body".to_string(), body.into());
        store
            .seed(&TenantScope::new("acme"), "notes", record)
            .expect("seed");
    }

    let output = export_entity(&store, &registry(), "notes", &ExportRequest::new("acme"))
        .await
        .expect("export");
    assert_eq!(output.row_count, 2);
    assert!(!output.truncated);
}
