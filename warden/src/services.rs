//! Service bundle handed to command handlers
//!
//! Each repository owns a clone of the pool and the shared settings; nothing
//! here is a process-wide static, so every test builds its own.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::accounts::{Account, AccountService};
use crate::config::{ConfigRegistry, SharedSettings};
use crate::error::{Error, Result};
use crate::groups::GroupGraph;
use crate::messaging::MessageQueue;
use crate::regions::RegionIndex;
use crate::restrictions::{Restriction, RestrictionClass, RestrictionLedger, SessionIdentities};
use crate::session::{Actor, SessionDirectory};

#[derive(Debug)]
pub struct Services {
    pub pool: SqlitePool,
    pub settings: SharedSettings,
    pub config: ConfigRegistry,
    pub groups: GroupGraph,
    pub accounts: AccountService,
    pub restrictions: RestrictionLedger,
    pub regions: RegionIndex,
    pub messages: Arc<MessageQueue>,
    pub sessions: SessionDirectory,
}

impl Services {
    pub fn new(pool: SqlitePool, settings: SharedSettings) -> Self {
        let groups = GroupGraph::new(pool.clone(), settings.clone());
        Self {
            accounts: AccountService::new(pool.clone(), settings.clone()),
            restrictions: RestrictionLedger::new(pool.clone()),
            regions: RegionIndex::new(pool.clone(), settings.clone(), groups.clone()),
            config: ConfigRegistry::new(),
            messages: MessageQueue::shared(),
            sessions: SessionDirectory::new(),
            groups,
            pool,
            settings,
        }
    }

    /// Active ban for the session's current identities
    async fn check_ban(&self, identities: &SessionIdentities) -> Result<()> {
        if let Some(ban) = self
            .restrictions
            .is_restricted(RestrictionClass::Ban, identities)
            .await?
        {
            return Err(Error::Unauthorized(ban.notice()));
        }
        Ok(())
    }

    /// Admit a new session, refusing banned identities
    pub async fn connect(&self, actor: &Actor) -> Result<()> {
        if let Err(e) = self.check_ban(&actor.identities()).await {
            warn!("Refused connection from {}: {}", actor.name, e);
            return Err(e);
        }
        self.sessions.join(actor);
        info!("{} connected", actor.name);
        Ok(())
    }

    /// Log a session into an account; the ban check runs again with the account name
    pub async fn login(&self, actor: &mut Actor, name: &str, password: &str) -> Result<Account> {
        if actor.is_logged_in() {
            return Err(Error::invalid(
                "You are already logged in, and cannot login again.",
            ));
        }

        let account = self.accounts.verify_password(name, password).await?;

        let mut identities = actor.identities();
        identities.account_name = Some(account.name.clone());
        if let Err(e) = self.check_ban(&identities).await {
            warn!("Refused login of {} as {}: {}", actor.name, account.name, e);
            return Err(e);
        }

        let account = self
            .accounts
            .record_login(&account.name, actor.uuid.as_deref(), actor.ip_address.as_deref())
            .await?;
        actor.account = Some(account.clone());
        self.sessions.join(actor);
        info!("{} authenticated as {}", actor.name, account.name);
        Ok(account)
    }

    /// Reload the actor's account so permission checks see current memberships
    pub async fn refresh(&self, actor: &mut Actor) -> Result<()> {
        let Some(account_id) = actor.account.as_ref().map(|a| a.account_id) else {
            return Ok(());
        };
        match self.accounts.get_by_id(account_id).await? {
            Some(account) => actor.account = Some(account),
            None => {
                warn!("Account of {} no longer exists, logging out", actor.name);
                actor.account = None;
                self.sessions.join(actor);
            }
        }
        Ok(())
    }

    pub fn logout(&self, actor: &mut Actor) -> Option<Account> {
        let account = actor.account.take();
        self.sessions.join(actor);
        if let Some(account) = &account {
            info!("{} logged out of {}", actor.name, account.name);
        }
        account
    }

    pub fn disconnect(&self, actor: &Actor) {
        if self.sessions.leave(&actor.name) {
            info!("{} disconnected", actor.name);
        }
    }

    /// Active mute for the session, if any
    pub async fn mute_for(&self, actor: &Actor) -> Result<Option<Restriction>> {
        self.restrictions
            .is_restricted(RestrictionClass::Mute, &actor.identities())
            .await
    }

    /// Whether `actor` may use `capability` at the point
    pub async fn can_act(&self, actor: &Actor, x: i32, y: i32, capability: &str) -> Result<bool> {
        let principal = actor.principal(&self.settings.get());
        self.regions
            .can_act(x, y, &principal, actor.account.as_ref(), capability)
            .await
    }
}
