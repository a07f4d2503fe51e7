//! Server settings
//!
//! Settings are layered with figment: built-in defaults, then an optional TOML
//! file, then `WARDEN_*` environment variables. Values changed at runtime are
//! persisted in the `settings` table and overlaid on the next boot.

mod registry;

pub use registry::{ConfigKey, ConfigRegistry};

use std::path::Path;
use std::sync::Arc;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::db;

/// Name of the non-interactive console actor; never available for registration
pub const CONSOLE_ACCOUNT_NAME: &str = "Server";

/// Settings read by the authorization core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Group assigned to actors that are not logged in
    pub default_guest_group_name: String,
    /// Group assigned to newly registered accounts
    pub default_registration_group_name: String,
    pub minimum_password_length: usize,
    /// log2 of the credential hashing rounds
    pub credential_work_factor: u32,
    pub command_prefix: String,
    pub command_silent_prefix: String,
    /// Cap on the per-account known identity history
    pub max_known_identities: usize,
    /// World that region lookups are scoped to
    pub world_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_guest_group_name: "guest".to_string(),
            default_registration_group_name: "default".to_string(),
            minimum_password_length: 4,
            credential_work_factor: 7,
            command_prefix: "/".to_string(),
            command_silent_prefix: ".".to_string(),
            max_known_identities: 100,
            world_id: "world".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment.merge(Env::prefixed("WARDEN_")).extract()?;
        registry::validate(&settings)?;
        Ok(settings)
    }

    /// Command prefix, falling back to "/" when blank
    pub fn prefix(&self) -> &str {
        if self.command_prefix.trim().is_empty() {
            "/"
        } else {
            &self.command_prefix
        }
    }

    /// Silent command prefix, falling back to "." when blank
    pub fn silent_prefix(&self) -> &str {
        if self.command_silent_prefix.trim().is_empty() {
            "."
        } else {
            &self.command_silent_prefix
        }
    }
}

/// Settings shared between services; always read at call time
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the current settings
    pub fn get(&self) -> Settings {
        self.inner.read().clone()
    }

    /// Read a single value without cloning the whole struct
    pub fn read<T>(&self, f: impl FnOnce(&Settings) -> T) -> T {
        f(&self.inner.read())
    }

    /// Mutate settings in place
    pub fn update<T>(&self, f: impl FnOnce(&mut Settings) -> T) -> T {
        f(&mut self.inner.write())
    }

    /// Overlay values persisted in the `settings` table
    pub async fn apply_persisted(&self, pool: &SqlitePool) -> anyhow::Result<()> {
        let registry = ConfigRegistry::new();
        for (key, value) in db::all_settings(pool).await? {
            let Some(entry) = registry.get(&key) else {
                // Bootstrap markers share the table
                debug!("Skipping non-config setting {}", key);
                continue;
            };
            if let Err(e) = entry.apply(self, &value) {
                warn!("Ignoring persisted setting {}={}: {}", key, value, e);
            }
        }
        Ok(())
    }
}
