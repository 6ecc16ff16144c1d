//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use surrealdb_types::SurrealValue;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    identity_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in ["user", "signing_key", "refresh_session", "lease", "_migration"] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[derive(Debug, SurrealValue)]
struct MigrationRow {
    version: u32,
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    identity_db::run_migrations(&db).await.unwrap();
    identity_db::run_migrations(&db).await.unwrap();

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version")
        .await
        .unwrap();
    let rows: Vec<MigrationRow> = result.take(0).unwrap();
    let versions: Vec<u32> = rows.into_iter().map(|r| r.version).collect();
    assert_eq!(versions, (1..=identity_db::latest_version()).collect::<Vec<_>>());
}
