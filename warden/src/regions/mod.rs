//! Region index
//!
//! Regions are named rectangles scoped to a world. Where regions overlap the
//! one with the highest `z` decides; a restricted region limits the build
//! capability to its owner, its allow-lists and holders of the bypass
//! permission.

mod area;

pub use area::{Direction, Rect};

use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::auth::accounts::Account;
use crate::config::SharedSettings;
use crate::db;
use crate::error::{Error, Result};
use crate::groups::{GroupGraph, Principal};
use crate::permissions::EDIT_REGION;

/// A protected area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub region_id: i64,
    pub world_id: String,
    pub name: String,
    pub area: Rect,
    /// Overlap priority; higher wins
    pub z: i32,
    /// Account name that is always allowed
    pub owner: String,
    /// `false` turns the region into a marker with no effect
    pub restricted: bool,
    /// Allowed account ids
    pub allowed_identities: Vec<i64>,
    pub allowed_groups: Vec<String>,
}

impl Region {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.area.contains(x, y)
    }
}

/// Highest `z` wins; on a tie the earliest region in `regions` is kept
pub fn top_region(regions: &[Region]) -> Option<&Region> {
    let mut top: Option<&Region> = None;
    for region in regions {
        if top.is_none_or(|t| region.z > t.z) {
            top = Some(region);
        }
    }
    top
}

/// Region lifecycle notifications
#[derive(Debug, Clone)]
pub enum RegionEvent {
    Created(Region),
    Deleted(Region),
    Renamed { old: String, region: Region },
}

/// Persisted regions of the configured world
#[derive(Debug, Clone)]
pub struct RegionIndex {
    pool: SqlitePool,
    settings: SharedSettings,
    groups: GroupGraph,
    events: broadcast::Sender<RegionEvent>,
}

impl RegionIndex {
    pub fn new(pool: SqlitePool, settings: SharedSettings, groups: GroupGraph) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pool,
            settings,
            groups,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegionEvent) {
        let _ = self.events.send(event);
    }

    fn world(&self) -> String {
        self.settings.read(|s| s.world_id.clone())
    }

    pub async fn create(&self, name: &str, area: Rect, owner: &str, z: i32) -> Result<Region> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("Region name cannot be empty."));
        }
        if self.get(name).await?.is_some() {
            return Err(Error::conflict("region", name));
        }

        let region = Region {
            id: uuid::Uuid::new_v4().to_string(),
            region_id: db::next_sequence(&self.pool, "regions").await?,
            world_id: self.world(),
            name: name.to_string(),
            area,
            z,
            owner: owner.to_string(),
            restricted: true,
            allowed_identities: Vec::new(),
            allowed_groups: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO regions (id, region_id, world_id, name, x, y, width, height, z, owner, restricted,
                                  allowed_identities, allowed_groups)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&region.id)
        .bind(region.region_id)
        .bind(&region.world_id)
        .bind(&region.name)
        .bind(region.area.x)
        .bind(region.area.y)
        .bind(region.area.width)
        .bind(region.area.height)
        .bind(region.z)
        .bind(&region.owner)
        .bind(region.restricted)
        .bind(serde_json::to_string(&region.allowed_identities)?)
        .bind(serde_json::to_string(&region.allowed_groups)?)
        .execute(&self.pool)
        .await?;

        info!("Region {} defined at {} by {}", region.name, region.area, owner);
        self.emit(RegionEvent::Created(region.clone()));
        Ok(region)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Region>> {
        let row: Option<RegionRow> =
            sqlx::query_as("SELECT * FROM regions WHERE world_id = ? AND name = ?")
                .bind(self.world())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RegionRow::into_region).transpose()
    }

    pub async fn get_by_id(&self, region_id: i64) -> Result<Option<Region>> {
        let row: Option<RegionRow> =
            sqlx::query_as("SELECT * FROM regions WHERE world_id = ? AND region_id = ?")
                .bind(self.world())
                .bind(region_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RegionRow::into_region).transpose()
    }

    /// Look up by name, falling back to a numeric id
    pub async fn find(&self, key: &str) -> Result<Option<Region>> {
        if let Some(region) = self.get(key).await? {
            return Ok(Some(region));
        }
        match key.parse() {
            Ok(id) => self.get_by_id(id).await,
            Err(_) => Ok(None),
        }
    }

    async fn require(&self, key: &str) -> Result<Region> {
        self.find(key)
            .await?
            .ok_or_else(|| Error::not_found("region", key))
    }

    pub async fn list(&self) -> Result<Vec<Region>> {
        let rows: Vec<RegionRow> =
            sqlx::query_as("SELECT * FROM regions WHERE world_id = ? ORDER BY name")
                .bind(self.world())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(RegionRow::into_region).collect()
    }

    async fn save(&self, region: &Region) -> Result<()> {
        sqlx::query(
            "UPDATE regions SET x = ?, y = ?, width = ?, height = ?, z = ?, owner = ?, restricted = ?,
                                allowed_identities = ?, allowed_groups = ?
             WHERE id = ?",
        )
        .bind(region.area.x)
        .bind(region.area.y)
        .bind(region.area.width)
        .bind(region.area.height)
        .bind(region.z)
        .bind(&region.owner)
        .bind(region.restricted)
        .bind(serde_json::to_string(&region.allowed_identities)?)
        .bind(serde_json::to_string(&region.allowed_groups)?)
        .bind(&region.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Re-fetch, mutate and write back
    async fn modify(
        &self,
        key: &str,
        f: impl FnOnce(&mut Region) -> Result<()>,
    ) -> Result<Region> {
        let mut region = self.require(key).await?;
        f(&mut region)?;
        self.save(&region).await?;
        Ok(region)
    }

    pub async fn delete(&self, key: &str) -> Result<Region> {
        let region = self.require(key).await?;
        sqlx::query("DELETE FROM regions WHERE id = ?")
            .bind(&region.id)
            .execute(&self.pool)
            .await?;

        warn!("Region {} deleted", region.name);
        self.emit(RegionEvent::Deleted(region.clone()));
        Ok(region)
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<Region> {
        let new = new.trim();
        if new.is_empty() {
            return Err(Error::invalid("Region name cannot be empty."));
        }
        let mut region = self.require(old).await?;
        if self.get(new).await?.is_some() {
            return Err(Error::conflict("region", new));
        }

        sqlx::query("UPDATE regions SET name = ? WHERE id = ?")
            .bind(new)
            .bind(&region.id)
            .execute(&self.pool)
            .await?;

        let old = std::mem::replace(&mut region.name, new.to_string());
        info!("Region {} renamed to {}", old, region.name);
        self.emit(RegionEvent::Renamed {
            old,
            region: region.clone(),
        });
        Ok(region)
    }

    pub async fn resize(&self, key: &str, amount: i32, direction: Direction) -> Result<Region> {
        let region = self
            .modify(key, |r| {
                r.area = r.area.resized(direction, amount)?;
                Ok(())
            })
            .await?;
        debug!("Region {} resized to {}", region.name, region.area);
        Ok(region)
    }

    pub async fn reposition(&self, key: &str, area: Rect) -> Result<Region> {
        self.modify(key, |r| {
            r.area = area;
            Ok(())
        })
        .await
    }

    pub async fn set_restricted(&self, key: &str, restricted: bool) -> Result<Region> {
        self.modify(key, |r| {
            r.restricted = restricted;
            Ok(())
        })
        .await
    }

    pub async fn set_z(&self, key: &str, z: i32) -> Result<Region> {
        self.modify(key, |r| {
            r.z = z;
            Ok(())
        })
        .await
    }

    pub async fn change_owner(&self, key: &str, owner: &str) -> Result<Region> {
        self.modify(key, |r| {
            r.owner = owner.to_string();
            Ok(())
        })
        .await
    }

    pub async fn allow_identity(&self, key: &str, account_id: i64) -> Result<Region> {
        self.modify(key, |r| {
            if !r.allowed_identities.contains(&account_id) {
                r.allowed_identities.push(account_id);
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_identity(&self, key: &str, account_id: i64) -> Result<Region> {
        self.modify(key, |r| {
            if !r.allowed_identities.contains(&account_id) {
                return Err(Error::not_found("allowed account", format!("#{}", account_id)));
            }
            r.allowed_identities.retain(|id| *id != account_id);
            Ok(())
        })
        .await
    }

    pub async fn allow_group(&self, key: &str, group: &str) -> Result<Region> {
        if !self.groups.exists(group).await? {
            return Err(Error::not_found("group", group));
        }
        self.modify(key, |r| {
            if !r.allowed_groups.iter().any(|g| g == group) {
                r.allowed_groups.push(group.to_string());
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_group(&self, key: &str, group: &str) -> Result<Region> {
        self.modify(key, |r| {
            if !r.allowed_groups.iter().any(|g| g == group) {
                return Err(Error::not_found("allowed group", group));
            }
            r.allowed_groups.retain(|g| g != group);
            Ok(())
        })
        .await
    }

    /// Every region containing the point, oldest first
    pub async fn query_point(&self, x: i32, y: i32) -> Result<Vec<Region>> {
        let rows: Vec<RegionRow> = sqlx::query_as(
            "SELECT * FROM regions
             WHERE world_id = ? AND ? >= x AND ? <= x + width AND ? >= y AND ? <= y + height
             ORDER BY region_id",
        )
        .bind(self.world())
        .bind(x)
        .bind(x)
        .bind(y)
        .bind(y)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RegionRow::into_region).collect()
    }

    /// Region that governs the point, if any
    pub async fn top_region(&self, x: i32, y: i32) -> Result<Option<Region>> {
        let regions = self.query_point(x, y).await?;
        Ok(top_region(&regions).cloned())
    }

    /// Whether the actor may use `capability` at the point
    ///
    /// Within a restricted region the owner and allow-listed accounts or
    /// groups may act whether or not they hold the capability globally.
    /// Everyone else needs the capability, and inside a restricted region also
    /// the bypass permission. Actors without an account are never allow-listed.
    pub async fn can_act(
        &self,
        x: i32,
        y: i32,
        principal: &Principal,
        account: Option<&Account>,
        capability: &str,
    ) -> Result<bool> {
        let region = self.top_region(x, y).await?;
        if let (Some(region), Some(account)) = (region.as_ref(), account) {
            if region.restricted && self.allows(region, principal, account).await? {
                return Ok(true);
            }
        }

        if !self.groups.has_permission(principal, capability).await? {
            return Ok(false);
        }
        match region {
            Some(region) if region.restricted => {
                self.groups.has_permission(principal, EDIT_REGION).await
            }
            _ => Ok(true),
        }
    }

    async fn allows(
        &self,
        region: &Region,
        principal: &Principal,
        account: &Account,
    ) -> Result<bool> {
        if region.owner == account.name || region.allowed_identities.contains(&account.account_id)
        {
            return Ok(true);
        }
        self.groups
            .in_any_group(principal, &region.allowed_groups)
            .await
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct RegionRow {
    id: String,
    region_id: i64,
    world_id: String,
    name: String,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    z: i32,
    owner: String,
    restricted: bool,
    allowed_identities: String,
    allowed_groups: String,
}

impl RegionRow {
    fn into_region(self) -> Result<Region> {
        Ok(Region {
            id: self.id,
            region_id: self.region_id,
            world_id: self.world_id,
            name: self.name,
            area: Rect::new(self.x, self.y, self.width, self.height)?,
            z: self.z,
            owner: self.owner,
            restricted: self.restricted,
            allowed_identities: serde_json::from_str(&self.allowed_identities)?,
            allowed_groups: serde_json::from_str(&self.allowed_groups)?,
        })
    }
}
