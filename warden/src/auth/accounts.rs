//! Account service
//!
//! Registration, credential checks, group membership and the known identity
//! history of persisted accounts.

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::{hash_credential, needs_rehash, verify_credential};
use crate::config::{Settings, SharedSettings, CONSOLE_ACCOUNT_NAME};
use crate::db;
use crate::error::{Error, Result};
use crate::groups::Principal;
use crate::permissions::parse_permission;

/// Hard floor under the configurable minimum password length
const MIN_PASSWORD_FLOOR: usize = 4;

/// Persisted account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Opaque storage key
    pub id: String,
    /// Sequence-assigned id, never reused
    pub account_id: i64,
    pub name: String,
    pub credential_hash: String,
    /// Device identifier last seen for this account
    pub uuid: String,
    /// Group memberships, primary first
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
    /// Network origins of past sessions, oldest first
    pub known_identities: Vec<String>,
    pub registered_at: String,
    pub last_accessed: String,
}

impl Account {
    pub fn primary_group(&self) -> Option<&str> {
        self.groups.first().map(String::as_str)
    }

    /// Permission subject for this account
    ///
    /// An account stripped of every membership falls back to the registration
    /// group.
    pub fn principal(&self, settings: &Settings) -> Principal {
        let groups = if self.groups.is_empty() {
            vec![settings.default_registration_group_name.clone()]
        } else {
            self.groups.clone()
        };
        Principal::new(groups, self.permissions.clone())
    }
}

/// Append `value` unless it repeats the newest entry, keeping at most `cap`
fn push_known_identity(history: &mut Vec<String>, value: &str, cap: usize) {
    if history.last().map(String::as_str) == Some(value) {
        return;
    }
    history.push(value.to_string());
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}

/// Trim and length-check a password
fn validate_password(password: &str, settings: &Settings) -> Result<String> {
    let password = password.trim();
    let minimum = settings.minimum_password_length.max(MIN_PASSWORD_FLOOR);
    if password.chars().count() < minimum {
        return Err(Error::invalid(format!(
            "Password must be greater than or equal to {} characters.",
            minimum
        )));
    }
    Ok(password.to_string())
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("Account name cannot be empty."));
    }
    if name == CONSOLE_ACCOUNT_NAME {
        return Err(Error::invalid(format!("\"{}\" is a reserved name.", name)));
    }
    Ok(name.to_string())
}

async fn group_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM groups WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Rewrite a group name inside every membership list
///
/// `None` drops the membership. Runs on the caller's connection so it can join
/// a group rename or delete transaction.
pub(crate) async fn rewrite_memberships(
    conn: &mut SqliteConnection,
    old: &str,
    new: Option<&str>,
) -> Result<u64> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, groups FROM accounts
         WHERE EXISTS (SELECT 1 FROM json_each(accounts.groups) WHERE value = ?)",
    )
    .bind(old)
    .fetch_all(&mut *conn)
    .await?;

    let mut changed = 0;
    for (id, groups) in rows {
        let groups: Vec<String> = serde_json::from_str(&groups)?;
        let mut rewritten: Vec<String> = Vec::with_capacity(groups.len());
        for g in groups {
            let g = if g == old {
                match new {
                    Some(n) => n.to_string(),
                    None => continue,
                }
            } else {
                g
            };
            if !rewritten.contains(&g) {
                rewritten.push(g);
            }
        }

        sqlx::query("UPDATE accounts SET groups = ? WHERE id = ?")
            .bind(serde_json::to_string(&rewritten)?)
            .bind(&id)
            .execute(&mut *conn)
            .await?;
        changed += 1;
    }

    Ok(changed)
}

/// Account service
#[derive(Debug, Clone)]
pub struct AccountService {
    pool: SqlitePool,
    settings: SharedSettings,
}

impl AccountService {
    pub fn new(pool: SqlitePool, settings: SharedSettings) -> Self {
        Self { pool, settings }
    }

    /// Register an account in the configured registration group
    pub async fn register(&self, name: &str, password: &str, uuid: &str) -> Result<Account> {
        self.create(name, password, uuid, None).await
    }

    /// Create an account, optionally in a specific group
    pub async fn create(
        &self,
        name: &str,
        password: &str,
        uuid: &str,
        group: Option<&str>,
    ) -> Result<Account> {
        let settings = self.settings.get();
        let name = validate_name(name)?;
        let password = validate_password(password, &settings)?;

        if self.get_by_name(&name).await?.is_some() {
            return Err(Error::conflict("account", name));
        }

        let group = group
            .map(str::to_string)
            .unwrap_or_else(|| settings.default_registration_group_name.clone());
        if !group_exists(&self.pool, &group).await? {
            return Err(Error::not_found("group", group));
        }

        let account_id = db::next_sequence(&self.pool, "accounts").await?;
        let now = chrono::Utc::now().to_rfc3339();
        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            name,
            credential_hash: hash_credential(&password, settings.credential_work_factor),
            uuid: uuid.to_string(),
            groups: vec![group],
            permissions: Vec::new(),
            known_identities: Vec::new(),
            registered_at: now.clone(),
            last_accessed: now,
        };

        sqlx::query(
            "INSERT INTO accounts (id, account_id, name, credential_hash, uuid, groups, permissions,
                                   known_identities, registered_at, last_accessed)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id)
        .bind(account.account_id)
        .bind(&account.name)
        .bind(&account.credential_hash)
        .bind(&account.uuid)
        .bind(serde_json::to_string(&account.groups)?)
        .bind(serde_json::to_string(&account.permissions)?)
        .bind(serde_json::to_string(&account.known_identities)?)
        .bind(&account.registered_at)
        .bind(&account.last_accessed)
        .execute(&self.pool)
        .await?;

        info!(
            "Account {} (#{}) created in group {}",
            account.name, account.account_id, account.groups[0]
        );
        Ok(account)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_account).transpose()
    }

    pub async fn get_by_id(&self, account_id: i64) -> Result<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT * FROM accounts WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AccountRow::into_account).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as("SELECT * FROM accounts ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn require(&self, name: &str) -> Result<Account> {
        self.get_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("account", name))
    }

    /// Persist every mutable field of a re-fetched account
    async fn save(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET credential_hash = ?, uuid = ?, groups = ?, permissions = ?,
                                 known_identities = ?, last_accessed = ?
             WHERE id = ?",
        )
        .bind(&account.credential_hash)
        .bind(&account.uuid)
        .bind(serde_json::to_string(&account.groups)?)
        .bind(serde_json::to_string(&account.permissions)?)
        .bind(serde_json::to_string(&account.known_identities)?)
        .bind(&account.last_accessed)
        .bind(&account.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch, mutate and write back in one step
    async fn modify(
        &self,
        name: &str,
        f: impl FnOnce(&mut Account) -> Result<()>,
    ) -> Result<Account> {
        let mut account = self.require(name).await?;
        f(&mut account)?;
        self.save(&account).await?;
        Ok(account)
    }

    /// Check a password, upgrading the stored hash when its work factor is stale
    pub async fn verify_password(&self, name: &str, password: &str) -> Result<Account> {
        let mut account = self.require(name).await?;
        let password = password.trim();

        if !verify_credential(password, &account.credential_hash) {
            return Err(Error::Unauthorized("Invalid password.".to_string()));
        }

        let work_factor = self.settings.read(|s| s.credential_work_factor);
        if needs_rehash(&account.credential_hash, work_factor) {
            account.credential_hash = hash_credential(password, work_factor);
            self.save(&account).await?;
            info!(
                "Upgraded credential of {} to work factor {}",
                account.name, work_factor
            );
        }

        Ok(account)
    }

    pub async fn set_password(&self, name: &str, password: &str) -> Result<Account> {
        let settings = self.settings.get();
        let password = validate_password(password, &settings)?;
        let account = self
            .modify(name, |a| {
                a.credential_hash = hash_credential(&password, settings.credential_work_factor);
                Ok(())
            })
            .await?;
        info!("Password changed for {}", account.name);
        Ok(account)
    }

    /// Replace all memberships; the first becomes primary
    pub async fn set_groups(&self, name: &str, groups: Vec<String>) -> Result<Account> {
        if groups.is_empty() {
            return Err(Error::invalid("An account needs at least one group."));
        }
        for group in &groups {
            if !group_exists(&self.pool, group).await? {
                return Err(Error::not_found("group", group.as_str()));
            }
        }
        self.modify(name, |a| {
            a.groups.clear();
            for g in groups {
                if !a.groups.contains(&g) {
                    a.groups.push(g);
                }
            }
            Ok(())
        })
        .await
    }

    /// Add a membership as the new primary group
    pub async fn add_group(&self, name: &str, group: &str) -> Result<Account> {
        if !group_exists(&self.pool, group).await? {
            return Err(Error::not_found("group", group));
        }
        self.modify(name, |a| {
            a.groups.retain(|g| g != group);
            a.groups.insert(0, group.to_string());
            Ok(())
        })
        .await
    }

    pub async fn remove_group(&self, name: &str, group: &str) -> Result<Account> {
        self.modify(name, |a| {
            if !a.groups.iter().any(|g| g == group) {
                return Err(Error::invalid(format!(
                    "{} is not a member of {}.",
                    a.name, group
                )));
            }
            if a.groups.len() == 1 {
                return Err(Error::invalid("An account needs at least one group."));
            }
            a.groups.retain(|g| g != group);
            Ok(())
        })
        .await
    }

    /// Grant a permission directly to the account
    pub async fn add_permission(&self, name: &str, permission: &str) -> Result<Account> {
        let (permission, negated) = parse_permission(permission)?;
        if negated {
            return Err(Error::invalid(
                "Per-account permissions cannot be negated.",
            ));
        }
        self.modify(name, |a| {
            if !a.permissions.contains(&permission) {
                a.permissions.push(permission);
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_permission(&self, name: &str, permission: &str) -> Result<Account> {
        self.modify(name, |a| {
            a.permissions.retain(|p| p != permission);
            Ok(())
        })
        .await
    }

    /// Stamp a successful login and remember where it came from
    pub async fn record_login(
        &self,
        name: &str,
        uuid: Option<&str>,
        address: Option<&str>,
    ) -> Result<Account> {
        let cap = self.settings.read(|s| s.max_known_identities);
        self.modify(name, |a| {
            a.last_accessed = chrono::Utc::now().to_rfc3339();
            if let Some(uuid) = uuid {
                a.uuid = uuid.to_string();
            }
            if let Some(address) = address {
                push_known_identity(&mut a.known_identities, address, cap);
            }
            Ok(())
        })
        .await
    }

    /// Delete an account together with its per-identity records
    pub async fn remove(&self, name: &str) -> Result<Account> {
        let account = self.require(name).await?;

        let mut tx = self.pool.begin().await?;
        for table in ["characters", "nicknames", "remembered_positions"] {
            let removed = sqlx::query(&format!("DELETE FROM {} WHERE account_id = ?", table))
                .bind(account.account_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if removed > 0 {
                debug!("Removed {} row from {}", account.name, table);
            }
        }
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(&account.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        warn!("Account {} (#{}) removed", account.name, account.account_id);
        Ok(account)
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    account_id: i64,
    name: String,
    credential_hash: String,
    uuid: String,
    groups: String,
    permissions: String,
    known_identities: String,
    registered_at: String,
    last_accessed: String,
}

impl AccountRow {
    fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: self.id,
            account_id: self.account_id,
            name: self.name,
            credential_hash: self.credential_hash,
            uuid: self.uuid,
            groups: serde_json::from_str(&self.groups)?,
            permissions: serde_json::from_str(&self.permissions)?,
            known_identities: serde_json::from_str(&self.known_identities)?,
            registered_at: self.registered_at,
            last_accessed: self.last_accessed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_pool, test_settings};

    async fn service() -> AccountService {
        let pool = test_pool().await;
        for (name, parent) in [("guest", None), ("default", Some("guest")), ("vip", None)] {
            sqlx::query("INSERT INTO groups (id, name, parent) VALUES (?, ?, ?)")
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(name)
                .bind(parent)
                .execute(&pool)
                .await
                .unwrap();
        }
        AccountService::new(pool, test_settings())
    }

    #[tokio::test]
    async fn test_register() {
        let accounts = service().await;

        let alice = accounts.register("alice", "password1", "dev-1").await.unwrap();
        assert_eq!(alice.name, "alice");
        assert_eq!(alice.primary_group(), Some("default"));
        assert!(alice.credential_hash.starts_with("$wsha$7$"));

        let bob = accounts.register("bob", "password2", "dev-2").await.unwrap();
        assert!(bob.account_id > alice.account_id);
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let accounts = service().await;

        let result = accounts.register("alice", "  abc  ", "dev-1").await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(accounts.get_by_name("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_minimum_length_has_a_floor() {
        let accounts = service().await;
        accounts.settings.update(|s| s.minimum_password_length = 1);

        let result = accounts.register("alice", "abc", "dev-1").await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_reserved() {
        let accounts = service().await;
        accounts.register("alice", "password1", "").await.unwrap();

        let dup = accounts.register("alice", "password1", "").await;
        assert!(matches!(dup, Err(Error::Conflict { .. })));

        // Names are case-sensitive
        accounts.register("Alice", "password1", "").await.unwrap();

        let reserved = accounts.register("Server", "password1", "").await;
        assert!(matches!(reserved, Err(Error::InvalidArgument(_))));
        // Only the exact console name is reserved
        accounts.register("server", "password1", "").await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_password_trims_and_rehashes() {
        let accounts = service().await;
        accounts.settings.update(|s| s.credential_work_factor = 4);
        accounts.register("alice", "password1", "").await.unwrap();

        let wrong = accounts.verify_password("alice", "password2").await;
        assert!(matches!(wrong, Err(Error::Unauthorized(_))));

        accounts.settings.update(|s| s.credential_work_factor = 6);
        let alice = accounts.verify_password("alice", " password1 ").await.unwrap();
        assert!(alice.credential_hash.starts_with("$wsha$6$"));

        let stored = accounts.get_by_name("alice").await.unwrap().unwrap();
        assert_eq!(stored.credential_hash, alice.credential_hash);
        accounts.verify_password("alice", "password1").await.unwrap();
    }

    #[tokio::test]
    async fn test_group_membership() {
        let accounts = service().await;
        accounts.register("alice", "password1", "").await.unwrap();

        let alice = accounts.add_group("alice", "vip").await.unwrap();
        assert_eq!(alice.groups, vec!["vip", "default"]);

        let missing = accounts.add_group("alice", "nope").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));

        let alice = accounts.remove_group("alice", "vip").await.unwrap();
        assert_eq!(alice.groups, vec!["default"]);

        let last = accounts.remove_group("alice", "default").await;
        assert!(matches!(last, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_account_permissions() {
        let accounts = service().await;
        accounts.register("alice", "password1", "").await.unwrap();

        accounts.add_permission("alice", "warp").await.unwrap();
        let alice = accounts.add_permission("alice", "warp").await.unwrap();
        assert_eq!(alice.permissions, vec!["warp"]);

        let negated = accounts.add_permission("alice", "!warp").await;
        assert!(matches!(negated, Err(Error::InvalidArgument(_))));

        let alice = accounts.remove_permission("alice", "warp").await.unwrap();
        assert!(alice.permissions.is_empty());
    }

    #[test]
    fn test_known_identity_history() {
        let mut history = Vec::new();
        push_known_identity(&mut history, "10.0.0.1", 3);
        push_known_identity(&mut history, "10.0.0.1", 3);
        assert_eq!(history, vec!["10.0.0.1"]);

        push_known_identity(&mut history, "10.0.0.2", 3);
        push_known_identity(&mut history, "10.0.0.1", 3);
        push_known_identity(&mut history, "10.0.0.3", 3);
        assert_eq!(history, vec!["10.0.0.2", "10.0.0.1", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_record_login() {
        let accounts = service().await;
        accounts.settings.update(|s| s.max_known_identities = 2);
        accounts.register("alice", "password1", "").await.unwrap();

        for address in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
            accounts
                .record_login("alice", Some("dev-9"), Some(address))
                .await
                .unwrap();
        }

        let alice = accounts.get_by_name("alice").await.unwrap().unwrap();
        assert_eq!(alice.uuid, "dev-9");
        assert_eq!(alice.known_identities, vec!["2.2.2.2", "3.3.3.3"]);
    }

    #[tokio::test]
    async fn test_remove_cascades() {
        let accounts = service().await;
        let alice = accounts.register("alice", "password1", "").await.unwrap();

        for table in ["characters", "nicknames", "remembered_positions"] {
            sqlx::query(&format!("INSERT INTO {} (account_id) VALUES (?)", table))
                .bind(alice.account_id)
                .execute(&accounts.pool)
                .await
                .unwrap();
        }

        accounts.remove("alice").await.unwrap();
        assert!(accounts.get_by_name("alice").await.unwrap().is_none());
        for table in ["characters", "nicknames", "remembered_positions"] {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&accounts.pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} not cleaned up", table);
        }

        let missing = accounts.remove("alice").await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_rewrite_memberships() {
        let accounts = service().await;
        accounts.register("alice", "password1", "").await.unwrap();
        accounts.add_group("alice", "vip").await.unwrap();

        let mut conn = accounts.pool.acquire().await.unwrap();
        let changed = rewrite_memberships(&mut conn, "vip", Some("gold"))
            .await
            .unwrap();
        assert_eq!(changed, 1);
        rewrite_memberships(&mut conn, "default", None).await.unwrap();
        drop(conn);

        let alice = accounts.get_by_name("alice").await.unwrap().unwrap();
        assert_eq!(alice.groups, vec!["gold"]);
    }

    #[test]
    fn test_principal_falls_back_to_registration_group() {
        let account = Account {
            id: String::new(),
            account_id: 1,
            name: "alice".into(),
            credential_hash: String::new(),
            uuid: String::new(),
            groups: Vec::new(),
            permissions: vec!["warp".into()],
            known_identities: Vec::new(),
            registered_at: String::new(),
            last_accessed: String::new(),
        };

        let principal = account.principal(&Settings::default());
        assert_eq!(principal.groups, vec!["default"]);
        assert_eq!(principal.permissions, vec!["warp"]);
    }
}
