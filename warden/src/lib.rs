//! warden - authorization and command dispatch for multi-user game servers
//!
//! Hierarchical permission groups, bans and mutes, protected regions and a
//! permission-gated command dispatcher, persisted in SQLite. A host embeds a
//! [`Warden`], feeds it the lines its sessions type and relays the queued
//! messages back to them.

pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod groups;
pub mod init;
pub mod messaging;
pub mod permissions;
pub mod regions;
pub mod restrictions;
pub mod services;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::info;

use auth::accounts::Account;
use commands::{CommandRegistry, DispatchOutcome};
use config::{Settings, SharedSettings};
use db::Database;
use messaging::MessageQueue;
use restrictions::RestrictionEvent;
use services::Services;
use session::Actor;

pub use error::{Error, Result};

/// Startup configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// SQLite file; `None` keeps everything in memory
    pub db_path: Option<PathBuf>,
    pub settings: Settings,
}

/// The authorization core a game server embeds
pub struct Warden {
    db: Database,
    services: Services,
    commands: CommandRegistry,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Warden {
    /// Open the store, overlay persisted settings and seed the default groups
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let path = config
            .db_path
            .as_deref()
            .map(|p| {
                p.to_str()
                    .ok_or_else(|| anyhow::anyhow!("Invalid database path: {}", p.display()))
            })
            .transpose()?;
        let db = Database::new(path).await?;

        let settings = SharedSettings::new(config.settings);
        settings.apply_persisted(db.pool()).await?;

        let services = Services::new(db.pool().clone(), settings);
        services.groups.ensure_default_groups().await?;

        let commands = CommandRegistry::with_builtins();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "warden ready: {} commands, {} groups",
            commands.len(),
            services.groups.list().await?.len()
        );

        Ok(Self {
            db,
            services,
            commands,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Hosts register their own commands next to the built-ins
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    pub fn messages(&self) -> &Arc<MessageQueue> {
        &self.services.messages
    }

    /// Ban and mute changes, so the host can drop or silence live sessions
    pub fn restriction_events(&self) -> broadcast::Receiver<RestrictionEvent> {
        self.services.restrictions.subscribe()
    }

    /// A console actor bound to this instance's message queue
    pub fn console(&self) -> Actor {
        Actor::console(self.services.messages.clone())
    }

    /// A new, not yet connected, player session
    pub fn player(&self, name: &str, uuid: Option<&str>, ip_address: Option<&str>) -> Actor {
        Actor::player(name, uuid, ip_address, self.services.messages.clone())
    }

    pub async fn connect(&self, actor: &Actor) -> Result<()> {
        self.services.connect(actor).await
    }

    pub async fn login(&self, actor: &mut Actor, name: &str, password: &str) -> Result<Account> {
        self.services.login(actor, name, password).await
    }

    pub fn disconnect(&self, actor: &Actor) {
        self.services.disconnect(actor);
    }

    /// Run one line of input as `actor`
    pub async fn dispatch(&self, actor: &mut Actor, input: &str) -> DispatchOutcome {
        commands::dispatch(&self.services, &self.commands, actor, input).await
    }

    /// Whether `actor` may use `capability` at the point
    pub async fn can_act(&self, actor: &Actor, x: i32, y: i32, capability: &str) -> Result<bool> {
        self.services.can_act(actor, x, y, capability).await
    }

    /// Signal everything waiting on [`Warden::shutdown_signal`]
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
