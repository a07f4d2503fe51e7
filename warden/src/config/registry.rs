//! Runtime-settable configuration keys
//!
//! Each key maps to a typed parser and setter. A value is parsed and validated
//! against a copy of the current settings and only committed when the whole
//! result is valid.

use std::collections::BTreeMap;

use sqlx::SqlitePool;
use tracing::info;

use super::{Settings, SharedSettings};
use crate::db;
use crate::error::{Error, Result};

type Setter = Box<dyn Fn(&mut Settings, &str) -> Result<()> + Send + Sync>;
type Getter = fn(&Settings) -> String;

/// A single settable key
pub struct ConfigKey {
    pub name: &'static str,
    pub description: &'static str,
    get: Getter,
    set: Setter,
    /// Value must name an existing group
    names_group: bool,
}

impl std::fmt::Debug for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigKey").field("name", &self.name).finish()
    }
}

impl ConfigKey {
    fn new(
        name: &'static str,
        description: &'static str,
        get: Getter,
        set: impl Fn(&mut Settings, &str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            description,
            get,
            set: Box::new(set),
            names_group: false,
        }
    }

    fn naming_group(mut self) -> Self {
        self.names_group = true;
        self
    }

    /// Current value rendered as text
    pub fn value(&self, settings: &Settings) -> String {
        (self.get)(settings)
    }

    /// Parse, validate and commit a value
    pub fn apply(&self, shared: &SharedSettings, raw: &str) -> Result<()> {
        let mut candidate = shared.get();
        (self.set)(&mut candidate, raw)?;
        validate(&candidate)?;
        shared.update(|s| *s = candidate);
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::invalid(format!("Invalid value for {}: {}", key, raw)))
}

fn non_empty(key: &str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::invalid(format!("{} cannot be empty", key)));
    }
    Ok(value.to_string())
}

/// Cross-field invariants
pub(super) fn validate(settings: &Settings) -> Result<()> {
    if settings.command_prefix.trim().is_empty() && settings.command_silent_prefix.trim().is_empty()
    {
        return Err(Error::invalid(
            "command_prefix and command_silent_prefix cannot both be empty",
        ));
    }
    if settings.prefix() == settings.silent_prefix() {
        return Err(Error::invalid(
            "command_prefix and command_silent_prefix must differ",
        ));
    }
    if !(4..=20).contains(&settings.credential_work_factor) {
        return Err(Error::invalid(
            "credential_work_factor must be between 4 and 20",
        ));
    }
    if settings.max_known_identities == 0 {
        return Err(Error::invalid("max_known_identities must be at least 1"));
    }
    Ok(())
}

/// Table of every runtime-settable key
#[derive(Debug)]
pub struct ConfigRegistry {
    keys: BTreeMap<&'static str, ConfigKey>,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        let entries = vec![
            ConfigKey::new(
                "default_guest_group_name",
                "Group for actors that are not logged in",
                |s| s.default_guest_group_name.clone(),
                |s, v| {
                    s.default_guest_group_name = non_empty("default_guest_group_name", v)?;
                    Ok(())
                },
            )
            .naming_group(),
            ConfigKey::new(
                "default_registration_group_name",
                "Group for newly registered accounts",
                |s| s.default_registration_group_name.clone(),
                |s, v| {
                    s.default_registration_group_name =
                        non_empty("default_registration_group_name", v)?;
                    Ok(())
                },
            )
            .naming_group(),
            ConfigKey::new(
                "minimum_password_length",
                "Shortest accepted password",
                |s| s.minimum_password_length.to_string(),
                |s, v| {
                    s.minimum_password_length = parse_number("minimum_password_length", v)?;
                    Ok(())
                },
            ),
            ConfigKey::new(
                "credential_work_factor",
                "log2 of the password hashing rounds",
                |s| s.credential_work_factor.to_string(),
                |s, v| {
                    s.credential_work_factor = parse_number("credential_work_factor", v)?;
                    Ok(())
                },
            ),
            ConfigKey::new(
                "command_prefix",
                "Prefix for commands",
                |s| s.command_prefix.clone(),
                |s, v| {
                    s.command_prefix = v.trim().to_string();
                    Ok(())
                },
            ),
            ConfigKey::new(
                "command_silent_prefix",
                "Prefix for silent commands",
                |s| s.command_silent_prefix.clone(),
                |s, v| {
                    s.command_silent_prefix = v.trim().to_string();
                    Ok(())
                },
            ),
            ConfigKey::new(
                "max_known_identities",
                "Known identity history kept per account",
                |s| s.max_known_identities.to_string(),
                |s, v| {
                    s.max_known_identities = parse_number("max_known_identities", v)?;
                    Ok(())
                },
            ),
            ConfigKey::new(
                "world_id",
                "World that region lookups are scoped to",
                |s| s.world_id.clone(),
                |s, v| {
                    s.world_id = non_empty("world_id", v)?;
                    Ok(())
                },
            ),
        ];

        Self {
            keys: entries.into_iter().map(|k| (k.name, k)).collect(),
        }
    }

    /// Look up a key (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&ConfigKey> {
        self.keys.get(name.to_lowercase().as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.keys.values()
    }

    /// Set a key, then persist it so it survives a restart
    pub async fn set(
        &self,
        shared: &SharedSettings,
        pool: &SqlitePool,
        name: &str,
        raw: &str,
    ) -> Result<String> {
        let key = self
            .get(name)
            .ok_or_else(|| Error::not_found("config key", name))?;

        // Default group keys must name an existing group
        let group = raw.trim();
        if key.names_group && !group.is_empty() {
            let found: Option<(String,)> = sqlx::query_as("SELECT id FROM groups WHERE name = ?")
                .bind(group)
                .fetch_optional(pool)
                .await?;
            if found.is_none() {
                return Err(Error::not_found("group", group));
            }
        }

        key.apply(shared, raw)?;

        let value = shared.read(|s| key.value(s));
        db::put_setting(pool, key.name, &value).await?;
        info!("Config {} set to {}", key.name, value);
        Ok(value)
    }
}
