//! Unit tests for database initialization
//!
//! Tests cover:
//! - Automatic database creation with default schema
//! - Idempotent re-open of an existing database
//! - Storage-level backstops: natural-key uniqueness and cascades

use exintel_common::db::init::{init_database, init_memory_database};
use sqlx::SqlitePool;

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn insert_exchange(pool: &SqlitePool, id: &str, name: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exchanges (id, name, name_key, market_type, created_at, updated_at)
         VALUES (?, ?, ?, 'global', '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z')",
    )
    .bind(id)
    .bind(name)
    .bind(name.trim().to_lowercase())
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("exintel.db");

    let pool = init_database(&db_path).await.expect("init should succeed");

    assert!(db_path.exists(), "Database file was not created");
    let tables = table_names(&pool).await;
    for expected in [
        "exchange_features",
        "exchanges",
        "feature_categories",
        "feature_update_logs",
        "feature_update_suggestions",
        "features",
        "screenshots",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }

    pool.close().await;
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("exintel.db");

    let pool1 = init_database(&db_path).await.unwrap();
    insert_exchange(&pool1, "ex-1", "Binance").await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.expect("re-open should succeed");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exchanges")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
    pool2.close().await;
}

#[tokio::test]
async fn test_exchange_name_key_unique() {
    let pool = init_memory_database().await.unwrap();

    insert_exchange(&pool, "ex-1", "Binance").await.unwrap();
    let dup = insert_exchange(&pool, "ex-2", " BINANCE ").await;

    let err = dup.expect_err("case-variant duplicate must be rejected");
    let is_unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    assert!(is_unique, "expected unique violation, got {:?}", err);
}

#[tokio::test]
async fn test_exchange_delete_cascades_to_cells() {
    let pool = init_memory_database().await.unwrap();
    let ts = "2025-01-01T00:00:00.000000Z";

    insert_exchange(&pool, "ex-1", "Binance").await.unwrap();
    sqlx::query("INSERT INTO feature_categories (id, name, sort_order, created_at) VALUES ('cat-1', 'Trading', 3, ?)")
        .bind(ts)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO features (id, name, slug, category_id, created_at, updated_at)
         VALUES ('f-1', 'convert', 'convert', 'cat-1', ?, ?)",
    )
    .bind(ts)
    .bind(ts)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO exchange_features (id, exchange_id, feature_id, has_feature, feature_status, created_at, updated_at)
         VALUES ('c-1', 'ex-1', 'f-1', 1, 'available', ?, ?)",
    )
    .bind(ts)
    .bind(ts)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM exchanges WHERE id = 'ex-1'")
        .execute(&pool)
        .await
        .unwrap();

    let cells: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exchange_features")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(cells, 0);
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let pool = init_memory_database().await.unwrap();
    exintel_common::db::init::create_schema(&pool)
        .await
        .expect("second schema pass should be a no-op");
}
