//! Group graph
//!
//! Groups form a forest through single-parent links stored by name. Each node
//! grants and negates permissions; [`resolve`] turns memberships into an
//! effective permission set. Every query reads the groups table fresh so
//! concurrent edits are never served from a stale copy.

mod resolve;

pub use resolve::{
    ancestor_chain, in_any_group, resolve_group, resolve_principal, set_allows, would_cycle,
    GroupMap, Principal,
};

use std::collections::BTreeSet;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::auth::accounts::rewrite_memberships;
use crate::config::SharedSettings;
use crate::db;
use crate::error::{Error, Result};
use crate::permissions::{self, parse_permission, WILDCARD};

/// Settings marker recording that first-run seeding already happened
const DEFAULTS_MARKER: &str = "default_groups_created";

/// Name of the wildcard group seeded on first run
pub const ADMIN_GROUP: &str = "admin";

/// A node in the permission forest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Parent group name; a name that no longer resolves acts as a root
    pub parent: Option<String>,
    pub permissions: Vec<String>,
    pub negated_permissions: Vec<String>,
    pub prefix: String,
    pub suffix: String,
    /// "R,G,B"
    pub chat_color: String,
    /// Higher weight wins display attributes across memberships
    pub weight: i64,
}

impl Group {
    pub fn new(name: &str, parent: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            permissions: Vec::new(),
            negated_permissions: Vec::new(),
            prefix: String::new(),
            suffix: String::new(),
            chat_color: "255,255,255".to_string(),
            weight: 0,
        }
    }

    /// Grant or negate a permission; `!name` negates
    ///
    /// A node never both grants and negates the same name.
    pub fn add_permission(&mut self, raw: &str) -> Result<()> {
        let (name, negated) = parse_permission(raw)?;
        let (target, other) = if negated {
            (&mut self.negated_permissions, &mut self.permissions)
        } else {
            (&mut self.permissions, &mut self.negated_permissions)
        };
        other.retain(|p| *p != name);
        if !target.contains(&name) {
            target.push(name);
        }
        Ok(())
    }

    /// Remove a grant, or a negation when prefixed with `!`
    pub fn remove_permission(&mut self, raw: &str) -> Result<()> {
        let (name, negated) = parse_permission(raw)?;
        if negated {
            self.negated_permissions.retain(|p| *p != name);
        } else {
            self.permissions.retain(|p| *p != name);
        }
        Ok(())
    }

    /// Grants followed by `!`-prefixed negations
    pub fn permission_list(&self) -> Vec<String> {
        self.permissions
            .iter()
            .cloned()
            .chain(
                self.negated_permissions
                    .iter()
                    .map(|p| format!("{}{}", permissions::NEGATION_PREFIX, p)),
            )
            .collect()
    }
}

/// Parse and normalize an "R,G,B" color
pub fn parse_chat_color(raw: &str) -> Result<String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(Error::invalid(format!(
            "Invalid color \"{}\"; expected R,G,B",
            raw
        )));
    }

    let mut channels = [0u8; 3];
    for (slot, part) in channels.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| {
            Error::invalid(format!(
                "Invalid color \"{}\"; channels must be 0-255",
                raw
            ))
        })?;
    }

    Ok(format!("{},{},{}", channels[0], channels[1], channels[2]))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!("Invalid group name \"{}\"", name)));
    }
    if name == WILDCARD {
        return Err(Error::invalid("\"*\" cannot be used as a group name"));
    }
    Ok(())
}

/// Partial update applied by [`GroupGraph::update`]
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    /// `Some(None)` detaches the group from its parent
    pub parent: Option<Option<String>>,
    /// Replacement permission list; `!`-prefixed entries are negations
    pub permissions: Option<Vec<String>>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub chat_color: Option<String>,
    pub weight: Option<i64>,
}

/// Persisted group forest
#[derive(Debug, Clone)]
pub struct GroupGraph {
    pool: SqlitePool,
    settings: SharedSettings,
}

impl GroupGraph {
    pub fn new(pool: SqlitePool, settings: SharedSettings) -> Self {
        Self { pool, settings }
    }

    pub async fn get(&self, name: &str) -> Result<Option<Group>> {
        let row: Option<GroupRow> = sqlx::query_as("SELECT * FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(GroupRow::into_group).transpose()
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.is_some())
    }

    pub async fn list(&self) -> Result<Vec<Group>> {
        let rows: Vec<GroupRow> = sqlx::query_as("SELECT * FROM groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(GroupRow::into_group).collect()
    }

    /// All groups keyed by name
    pub async fn snapshot(&self) -> Result<GroupMap> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|g| (g.name.clone(), g))
            .collect())
    }

    async fn require(&self, name: &str) -> Result<Group> {
        self.get(name)
            .await?
            .ok_or_else(|| Error::not_found("group", name))
    }

    /// Reject a parent that is missing or would close a loop
    async fn check_parent(&self, name: &str, parent: &str) -> Result<()> {
        let groups = self.snapshot().await?;
        if !groups.contains_key(parent) {
            return Err(Error::not_found("parent group", parent));
        }
        if would_cycle(&groups, name, parent)? {
            let message = format!("{} -> {} -> {}", name, parent, name);
            error!("Refusing to parent {} under {}: cycle {}", name, parent, message);
            return Err(Error::CyclicReference(message));
        }
        Ok(())
    }

    pub async fn create(
        &self,
        name: &str,
        parent: Option<&str>,
        permissions: &[String],
    ) -> Result<Group> {
        validate_name(name)?;
        if self.exists(name).await? {
            return Err(Error::conflict("group", name));
        }
        if let Some(parent) = parent {
            self.check_parent(name, parent).await?;
        }

        let mut group = Group::new(name, parent);
        for perm in permissions {
            group.add_permission(perm)?;
        }

        sqlx::query(
            "INSERT INTO groups (id, name, parent, permissions, negated_permissions, prefix, suffix, chat_color, weight)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.parent)
        .bind(serde_json::to_string(&group.permissions)?)
        .bind(serde_json::to_string(&group.negated_permissions)?)
        .bind(&group.prefix)
        .bind(&group.suffix)
        .bind(&group.chat_color)
        .bind(group.weight)
        .execute(&self.pool)
        .await?;

        info!("Group {} created", group.name);
        Ok(group)
    }

    async fn save(&self, group: &Group) -> Result<()> {
        sqlx::query(
            "UPDATE groups SET parent = ?, permissions = ?, negated_permissions = ?,
                               prefix = ?, suffix = ?, chat_color = ?, weight = ?
             WHERE id = ?",
        )
        .bind(&group.parent)
        .bind(serde_json::to_string(&group.permissions)?)
        .bind(serde_json::to_string(&group.negated_permissions)?)
        .bind(&group.prefix)
        .bind(&group.suffix)
        .bind(&group.chat_color)
        .bind(group.weight)
        .bind(&group.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply a partial update; the new parent is validated before anything is written
    pub async fn update(&self, name: &str, update: GroupUpdate) -> Result<Group> {
        let mut group = self.require(name).await?;

        if let Some(parent) = update.parent {
            if let Some(parent) = parent.as_deref() {
                self.check_parent(name, parent).await?;
            }
            group.parent = parent;
        }
        if let Some(permissions) = update.permissions {
            group.permissions.clear();
            group.negated_permissions.clear();
            for perm in &permissions {
                group.add_permission(perm)?;
            }
        }
        if let Some(prefix) = update.prefix {
            group.prefix = prefix;
        }
        if let Some(suffix) = update.suffix {
            group.suffix = suffix;
        }
        if let Some(color) = update.chat_color {
            group.chat_color = parse_chat_color(&color)?;
        }
        if let Some(weight) = update.weight {
            group.weight = weight;
        }

        self.save(&group).await?;
        Ok(group)
    }

    pub async fn set_parent(&self, name: &str, parent: Option<&str>) -> Result<Group> {
        self.update(
            name,
            GroupUpdate {
                parent: Some(parent.map(str::to_string)),
                ..GroupUpdate::default()
            },
        )
        .await
    }

    pub async fn add_permissions(&self, name: &str, permissions: &[String]) -> Result<Group> {
        let mut group = self.require(name).await?;
        for perm in permissions {
            group.add_permission(perm)?;
        }
        self.save(&group).await?;
        Ok(group)
    }

    pub async fn remove_permissions(&self, name: &str, permissions: &[String]) -> Result<Group> {
        let mut group = self.require(name).await?;
        for perm in permissions {
            group.remove_permission(perm)?;
        }
        self.save(&group).await?;
        Ok(group)
    }

    /// Rename a group, cascading to children, memberships, region allow-lists
    /// and the default group settings
    pub async fn rename(&self, old: &str, new: &str) -> Result<Group> {
        validate_name(new)?;
        let mut group = self.require(old).await?;
        if self.exists(new).await? {
            return Err(Error::conflict("group", new));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE groups SET name = ? WHERE id = ?")
            .bind(new)
            .bind(&group.id)
            .execute(&mut *tx)
            .await?;
        let children = sqlx::query("UPDATE groups SET parent = ? WHERE parent = ?")
            .bind(new)
            .bind(old)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let members = rewrite_memberships(&mut *tx, old, Some(new)).await?;
        rewrite_region_groups(&mut *tx, old, Some(new)).await?;

        let settings = self.settings.get();
        let guest = settings.default_guest_group_name == old;
        let registration = settings.default_registration_group_name == old;
        if guest {
            put_setting_tx(&mut *tx, "default_guest_group_name", new).await?;
        }
        if registration {
            put_setting_tx(&mut *tx, "default_registration_group_name", new).await?;
        }
        tx.commit().await?;

        self.settings.update(|s| {
            if guest {
                s.default_guest_group_name = new.to_string();
            }
            if registration {
                s.default_registration_group_name = new.to_string();
            }
        });

        info!(
            "Group {} renamed to {} ({} children, {} members updated)",
            old, new, children, members
        );
        group.name = new.to_string();
        Ok(group)
    }

    /// Delete a group; children become roots and memberships are dropped
    pub async fn delete(&self, name: &str) -> Result<()> {
        let (guest, registration) = self.settings.read(|s| {
            (
                s.default_guest_group_name.clone(),
                s.default_registration_group_name.clone(),
            )
        });
        if name == guest || name == registration {
            error!("Refusing to delete default group {}", name);
            return Err(Error::ProtectedResource(format!(
                "Group \"{}\" is a configured default group and cannot be deleted",
                name
            )));
        }

        let group = self.require(name).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(&group.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE groups SET parent = NULL WHERE parent = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        rewrite_memberships(&mut *tx, name, None).await?;
        rewrite_region_groups(&mut *tx, name, None).await?;
        tx.commit().await?;

        warn!("Group {} deleted", name);
        Ok(())
    }

    /// Effective permissions of a principal
    pub async fn resolve_permissions(&self, principal: &Principal) -> Result<BTreeSet<String>> {
        if principal.superuser {
            return resolve_principal(&GroupMap::new(), principal);
        }
        resolve_principal(&self.snapshot().await?, principal)
    }

    pub async fn has_permission(&self, principal: &Principal, permission: &str) -> Result<bool> {
        if principal.superuser {
            return Ok(true);
        }
        let perms = self.resolve_permissions(principal).await?;
        Ok(set_allows(&perms, permission))
    }

    /// Whether the principal holds any of `permissions`; empty means public
    pub async fn has_any_permission(
        &self,
        principal: &Principal,
        permissions: &[&str],
    ) -> Result<bool> {
        if permissions.is_empty() || principal.superuser {
            return Ok(true);
        }
        let perms = self.resolve_permissions(principal).await?;
        Ok(permissions.iter().any(|p| set_allows(&perms, p)))
    }

    /// Whether any membership or its ancestors is listed in `allowed`
    pub async fn in_any_group(&self, principal: &Principal, allowed: &[String]) -> Result<bool> {
        in_any_group(&self.snapshot().await?, &principal.groups, allowed)
    }

    /// Prefix of the heaviest member group; later memberships win ties
    pub async fn weighted_prefix(&self, principal: &Principal) -> Result<Option<String>> {
        let groups = self.snapshot().await?;
        let mut best: Option<&Group> = None;
        for name in &principal.groups {
            let Some(group) = groups.get(name) else {
                continue;
            };
            if best.is_none_or(|b| group.weight >= b.weight) {
                best = Some(group);
            }
        }
        Ok(best.map(|g| g.prefix.clone()))
    }

    /// Seed guest, default and admin once, then check the configured defaults exist
    pub async fn ensure_default_groups(&self) -> Result<()> {
        if db::get_setting(&self.pool, DEFAULTS_MARKER).await?.is_none() {
            let seeds: [(&str, Option<&str>, Vec<String>); 3] = [
                ("guest", None, permissions::guest_defaults()),
                ("default", Some("guest"), permissions::registered_defaults()),
                (ADMIN_GROUP, Some("default"), vec![WILDCARD.to_string()]),
            ];
            for (name, parent, perms) in seeds {
                if self.exists(name).await? {
                    continue;
                }
                self.create(name, parent, &perms).await?;
            }
            db::put_setting(&self.pool, DEFAULTS_MARKER, "true").await?;
            info!("Default groups created");
        }

        let (guest, registration) = self.settings.read(|s| {
            (
                s.default_guest_group_name.clone(),
                s.default_registration_group_name.clone(),
            )
        });
        for name in [guest, registration] {
            if !self.exists(&name).await? {
                error!("Configured default group {} does not exist", name);
                return Err(Error::not_found("default group", name));
            }
        }
        Ok(())
    }
}

async fn put_setting_tx(
    conn: &mut sqlx::SqliteConnection,
    key: &str,
    value: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Rewrite a group name inside region allow-lists
async fn rewrite_region_groups(
    conn: &mut sqlx::SqliteConnection,
    old: &str,
    new: Option<&str>,
) -> Result<()> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, allowed_groups FROM regions
         WHERE EXISTS (SELECT 1 FROM json_each(regions.allowed_groups) WHERE value = ?)",
    )
    .bind(old)
    .fetch_all(&mut *conn)
    .await?;

    for (id, allowed) in rows {
        let allowed: Vec<String> = serde_json::from_str(&allowed)?;
        let mut rewritten: Vec<String> = allowed.into_iter().filter(|g| g != old).collect();
        if let Some(new) = new {
            if !rewritten.iter().any(|g| g == new) {
                rewritten.push(new.to_string());
            }
        }
        sqlx::query("UPDATE regions SET allowed_groups = ? WHERE id = ?")
            .bind(serde_json::to_string(&rewritten)?)
            .bind(&id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    parent: Option<String>,
    permissions: String,
    negated_permissions: String,
    prefix: String,
    suffix: String,
    chat_color: String,
    weight: i64,
}

impl GroupRow {
    fn into_group(self) -> Result<Group> {
        Ok(Group {
            id: self.id,
            name: self.name,
            parent: self.parent,
            permissions: serde_json::from_str(&self.permissions)?,
            negated_permissions: serde_json::from_str(&self.negated_permissions)?,
            prefix: self.prefix,
            suffix: self.suffix,
            chat_color: self.chat_color,
            weight: self.weight,
        })
    }
}
