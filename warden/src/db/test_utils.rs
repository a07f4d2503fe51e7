//! Shared test utilities for database operations
//!
//! Every test module gets its pool from here so that unit tests run against
//! the same migrated schema as production.

use sqlx::SqlitePool;

use super::Database;
use crate::config::{Settings, SharedSettings};

/// Create an in-memory test database pool with full schema
pub async fn test_pool() -> SqlitePool {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}

/// Default settings wrapped for sharing
pub fn test_settings() -> SharedSettings {
    SharedSettings::new(Settings::default())
}
