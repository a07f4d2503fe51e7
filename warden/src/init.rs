//! One-time database setup for the warden_init tool

use std::path::Path;

use anyhow::{bail, Result};
use tracing::info;

use crate::auth::accounts::{Account, AccountService};
use crate::config::{Settings, SharedSettings};
use crate::db::Database;
use crate::groups::{GroupGraph, ADMIN_GROUP};

/// Create a fresh store with the default groups and one administrator
///
/// # Errors
/// * The database file already exists
/// * The administrator name or password is rejected by account validation
pub async fn init_database(
    path: &Path,
    settings: Settings,
    admin_name: &str,
    admin_password: &str,
) -> Result<Account> {
    if path.exists() {
        bail!(
            "Database file already exists: {}. Remove it first or use a different path.",
            path.display()
        );
    }
    let Some(db_path) = path.to_str() else {
        bail!("Invalid database path: {}", path.display());
    };

    info!("Creating new database at {}", path.display());
    let db = Database::new(Some(db_path)).await?;
    let settings = SharedSettings::new(settings);

    GroupGraph::new(db.pool().clone(), settings.clone())
        .ensure_default_groups()
        .await?;

    let accounts = AccountService::new(db.pool().clone(), settings);
    let account = accounts
        .create(admin_name, admin_password, "", Some(ADMIN_GROUP))
        .await?;
    info!(
        "Created administrator '{}' (#{}) in group {}",
        account.name, account.account_id, ADMIN_GROUP
    );

    info!("Database initialization complete");
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::Principal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_administrator() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("warden.db");

        init_database(&db_path, Settings::default(), "root", "password123")
            .await
            .unwrap();
        assert!(db_path.exists());

        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let settings = SharedSettings::new(Settings::default());
        let accounts = AccountService::new(db.pool().clone(), settings.clone());
        let account = accounts.get_by_name("root").await.unwrap().unwrap();
        assert_eq!(account.primary_group(), Some(ADMIN_GROUP));

        let groups = GroupGraph::new(db.pool().clone(), settings.clone());
        let principal: Principal = account.principal(&settings.get());
        assert!(groups.has_permission(&principal, "managegroup").await.unwrap());
    }

    #[tokio::test]
    async fn test_init_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("warden.db");

        init_database(&db_path, Settings::default(), "root", "password123")
            .await
            .unwrap();
        let result = init_database(&db_path, Settings::default(), "root", "password123").await;
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_init_enforces_password_length() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("warden.db");

        let result = init_database(&db_path, Settings::default(), "root", "abc").await;
        assert!(result.is_err());
    }
}
