use anyhow::{Context, Result};
use rowport_core::{FieldValue, Record, RecordStore, SelectQuery, SortSpec, TenantScope};
use rowport_store::PostgresStore;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;

const TABLE: &str = "rowport_it_assets";

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn reset_table(pool: &PgPool) -> Result<()> {
    let statements = [
        format!("DROP TABLE IF EXISTS {TABLE}"),
        format!(
            "CREATE TABLE {TABLE} (
               id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
               organization_id text NOT NULL,
               deleted_at timestamptz,
               tag text NOT NULL,
               name text,
               quantity bigint,
               purchased_on date
             )"
        ),
    ];
    for sql in &statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("executing {sql}"))?;
    }
    Ok(())
}

fn asset(tag: &str, name: Option<&str>, quantity: i64) -> Record {
    let mut record = Record::new();
    record.insert("tag".to_string(), tag.into());
    record.insert(
        "name".to_string(),
        name.map(FieldValue::from).unwrap_or(FieldValue::Null),
    );
    record.insert("quantity".to_string(), FieldValue::Integer(quantity));
    record
}

#[tokio::test]
async fn stores_and_finds_records_per_tenant() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL for integration tests");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;
    reset_table(&pool).await?;

    let store = PostgresStore::new(pool);
    let acme = TenantScope::new("acme");
    let globex = TenantScope::new("globex");

    let ids = store
        .insert_many(&acme, TABLE, &[asset("A-1", Some("Laptop"), 2), asset("A-2", None, 5)])
        .await?;
    assert_eq!(ids.len(), 2);
    store
        .insert_many(&globex, TABLE, &[asset("A-3", Some("Desk"), 1)])
        .await?;

    let key_fields = vec!["tag".to_string()];
    let keys = vec![vec![FieldValue::from("A-1")], vec![FieldValue::from("A-3")]];
    let found = store.find_existing(&acme, TABLE, &key_fields, &keys).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found.get("A-1"), Some(&ids[0]));

    let mut changes = Record::new();
    changes.insert("quantity".to_string(), FieldValue::Integer(9));
    store.update(&acme, TABLE, &ids[0], &changes).await?;

    let rows = store
        .select(
            &acme,
            TABLE,
            &SelectQuery {
                filters: Vec::new(),
                sort: Some(SortSpec {
                    field: "quantity".to_string(),
                    descending: true,
                }),
                limit: Some(10),
            },
        )
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("quantity"), Some(&FieldValue::Integer(9)));
    assert_eq!(rows[1].get("name"), Some(&FieldValue::Null));
    assert!(!rows[0].contains_key("organization_id"));

    Ok(())
}
