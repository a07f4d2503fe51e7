//! Database module - SQLite collections for groups, accounts, restrictions and regions

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

#[cfg(test)]
pub mod test_utils;

/// Database handle wrapping SQLite connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        // An in-memory database lives only as long as its connection
        let pool_options = match path {
            Some(_) => SqlitePoolOptions::new().max_connections(10),
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        };

        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Open an existing database file
    pub async fn open(path: &str) -> Result<Self> {
        Self::new(Some(path)).await
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                parent TEXT,
                permissions TEXT NOT NULL DEFAULT '[]',
                negated_permissions TEXT NOT NULL DEFAULT '[]',
                prefix TEXT NOT NULL DEFAULT '',
                suffix TEXT NOT NULL DEFAULT '',
                chat_color TEXT NOT NULL DEFAULT '255,255,255',
                weight INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                account_id INTEGER UNIQUE NOT NULL,
                name TEXT UNIQUE NOT NULL,
                credential_hash TEXT NOT NULL,
                uuid TEXT NOT NULL DEFAULT '',
                groups TEXT NOT NULL DEFAULT '[]',
                permissions TEXT NOT NULL DEFAULT '[]',
                known_identities TEXT NOT NULL DEFAULT '[]',
                registered_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Ban and mute entries; exactly one identity axis per row
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS restrictions (
                id TEXT PRIMARY KEY,
                restriction_id INTEGER NOT NULL,
                class TEXT NOT NULL,
                identifier_kind TEXT NOT NULL,
                identifier TEXT NOT NULL,
                reason TEXT NOT NULL DEFAULT '',
                issuer TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at INTEGER,
                UNIQUE(class, restriction_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regions (
                id TEXT PRIMARY KEY,
                region_id INTEGER NOT NULL,
                world_id TEXT NOT NULL,
                name TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                z INTEGER NOT NULL DEFAULT 0,
                owner TEXT NOT NULL,
                restricted INTEGER NOT NULL DEFAULT 1,
                allowed_identities TEXT NOT NULL DEFAULT '[]',
                allowed_groups TEXT NOT NULL DEFAULT '[]',
                UNIQUE(world_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Monotonic per-collection sequences
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Runtime configuration overrides and bootstrap markers
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-identity dependents, removed together with the account
        for table in ["characters", "nicknames", "remembered_positions"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    account_id INTEGER PRIMARY KEY,
                    data TEXT NOT NULL DEFAULT '{{}}',
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                table
            ))
            .execute(&self.pool)
            .await?;
        }

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_groups_parent ON groups(parent)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_restrictions_identifier ON restrictions(class, identifier)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_regions_world ON regions(world_id)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Next value of a named monotonic sequence; values are never reused
pub async fn next_sequence(pool: &SqlitePool, collection: &str) -> Result<i64, sqlx::Error> {
    let (value,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO counters (name, value) VALUES (?, 1)
        ON CONFLICT(name) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(collection)
    .fetch_one(pool)
    .await?;

    Ok(value)
}

/// Read a persisted setting
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(v,)| v))
}

/// Write a persisted setting
pub async fn put_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// All persisted settings
pub async fn all_settings(pool: &SqlitePool) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
        .fetch_all(pool)
        .await
}
