//! Database initialization
//!
//! Opens (or creates) the SQLite store and creates every table idempotently.
//! The pool is the only shared mutable resource; callers own its lifecycle
//! and close it at shutdown.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // foreign_keys is a per-connection pragma, so it is set on the connect
    // options rather than with a one-off PRAGMA query
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory store with the full schema
///
/// Every SQLite `:memory:` connection is a separate database, so the pool is
/// pinned to one connection that never expires.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_exchanges_table(pool).await?;
    create_feature_categories_table(pool).await?;
    create_features_table(pool).await?;
    create_exchange_features_table(pool).await?;
    create_feature_update_logs_table(pool).await?;
    create_feature_update_suggestions_table(pool).await?;
    create_screenshots_table(pool).await?;

    Ok(())
}

async fn create_exchanges_table(pool: &SqlitePool) -> Result<()> {
    // name_key is the trimmed, lowercased name: the case-insensitive natural key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchanges (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            market_type TEXT NOT NULL CHECK (market_type IN ('turkish', 'global')),
            website_url TEXT,
            announcement_url TEXT,
            twitter_handle TEXT,
            logo_url TEXT,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feature_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            icon TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_features_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS features (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            category_id TEXT NOT NULL REFERENCES feature_categories(id),
            sort_order INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_features_category ON features(category_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_exchange_features_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_features (
            id TEXT PRIMARY KEY,
            exchange_id TEXT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
            feature_id TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
            has_feature INTEGER NOT NULL DEFAULT 0,
            feature_status TEXT NOT NULL DEFAULT 'unknown' CHECK (feature_status IN
                ('available', 'not_available', 'beta', 'coming_soon', 'unknown')),
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (exchange_id, feature_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exchange_features_feature ON exchange_features(feature_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feature_update_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_update_logs (
            id TEXT PRIMARY KEY,
            exchange_id TEXT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
            feature_id TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
            old_status TEXT NOT NULL,
            new_status TEXT NOT NULL,
            update_source TEXT NOT NULL CHECK (update_source IN
                ('manual', 'ai_approved', 'excel_import')),
            updated_by TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_update_logs_created ON feature_update_logs(created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_feature_update_suggestions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_update_suggestions (
            id TEXT PRIMARY KEY,
            exchange_id TEXT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
            feature_id TEXT NOT NULL REFERENCES features(id) ON DELETE CASCADE,
            old_status TEXT NOT NULL,
            suggested_status TEXT NOT NULL,
            ai_confidence REAL NOT NULL CHECK (ai_confidence >= 0.0 AND ai_confidence <= 1.0),
            evidence TEXT,
            source_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN
                ('pending', 'approved', 'rejected')),
            created_at TEXT NOT NULL,
            reviewed_at TEXT,
            reviewed_by TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_status ON feature_update_suggestions(status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_screenshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS screenshots (
            id TEXT PRIMARY KEY,
            exchange_id TEXT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
            storage_key TEXT NOT NULL UNIQUE,
            feature_id TEXT REFERENCES features(id) ON DELETE SET NULL,
            category_id TEXT REFERENCES feature_categories(id) ON DELETE SET NULL,
            notes TEXT,
            ai_classification TEXT,
            ai_confidence REAL,
            classified_at TEXT,
            uploaded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
