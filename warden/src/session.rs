//! Connected actors
//!
//! An [`Actor`] is whoever issues commands: a player session or the server
//! console. It carries the identities the restriction ledger matches on, the
//! account once logged in, and pending free-text response callbacks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::auth::accounts::Account;
use crate::config::{Settings, CONSOLE_ACCOUNT_NAME};
use crate::groups::Principal;
use crate::messaging::{MessageKind, MessageQueue};
use crate::restrictions::SessionIdentities;

/// Single-shot callback for a free-text reply, keyed by the token that triggers it
pub type ResponseHandler = Box<dyn FnOnce(&mut Actor, &[String]) + Send + Sync>;

pub struct Actor {
    pub name: String,
    pub account: Option<Account>,
    pub uuid: Option<String>,
    pub ip_address: Option<String>,
    /// Last known world coordinates, if the host reports them
    pub position: Option<(i32, i32)>,
    interactive: bool,
    superuser: bool,
    awaiting: HashMap<String, ResponseHandler>,
    messages: Arc<MessageQueue>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("account", &self.account.as_ref().map(|a| &a.name))
            .field("interactive", &self.interactive)
            .field("awaiting", &self.awaiting.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Actor {
    /// A player session that has not logged in yet
    pub fn player(
        name: &str,
        uuid: Option<&str>,
        ip_address: Option<&str>,
        messages: Arc<MessageQueue>,
    ) -> Self {
        Self {
            name: name.to_string(),
            account: None,
            uuid: uuid.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            position: None,
            interactive: true,
            superuser: false,
            awaiting: HashMap::new(),
            messages,
        }
    }

    /// The server console: non-interactive and never denied
    pub fn console(messages: Arc<MessageQueue>) -> Self {
        Self {
            name: CONSOLE_ACCOUNT_NAME.to_string(),
            account: None,
            uuid: None,
            ip_address: None,
            position: None,
            interactive: false,
            superuser: true,
            awaiting: HashMap::new(),
            messages,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn is_logged_in(&self) -> bool {
        self.account.is_some()
    }

    pub fn account_name(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.name.as_str())
    }

    /// Identifiers for restriction lookups
    pub fn identities(&self) -> SessionIdentities {
        SessionIdentities {
            account_name: self.account_name().map(str::to_string),
            uuid: self.uuid.clone(),
            ip_address: self.ip_address.clone(),
        }
    }

    /// Permission subject; logged-out players belong to the guest group
    pub fn principal(&self, settings: &Settings) -> Principal {
        if self.superuser {
            return Principal::superuser();
        }
        match &self.account {
            Some(account) => account.principal(settings),
            None => Principal::new(vec![settings.default_guest_group_name.clone()], Vec::new()),
        }
    }

    pub fn messages(&self) -> &Arc<MessageQueue> {
        &self.messages
    }

    pub fn send(&self, kind: MessageKind, text: impl Into<String>) {
        self.messages.send(&self.name, kind, text);
    }

    pub fn send_info(&self, text: impl Into<String>) {
        self.send(MessageKind::Info, text);
    }

    pub fn send_success(&self, text: impl Into<String>) {
        self.send(MessageKind::Success, text);
    }

    pub fn send_error(&self, text: impl Into<String>) {
        self.send(MessageKind::Error, text);
    }

    pub fn send_warning(&self, text: impl Into<String>) {
        self.send(MessageKind::Warning, text);
    }

    /// Register a callback for the next command named `token`, ignoring case
    pub fn await_response(&mut self, token: &str, handler: ResponseHandler) {
        self.awaiting.insert(token.to_lowercase(), handler);
    }

    /// Remove and return the callback registered under `token`
    pub fn take_response(&mut self, token: &str) -> Option<ResponseHandler> {
        self.awaiting.remove(&token.to_lowercase())
    }

    pub fn is_awaiting(&self, token: &str) -> bool {
        self.awaiting.contains_key(&token.to_lowercase())
    }
}

/// Online sessions keyed by display name
///
/// Commands that target another player (`/mute bob`) look the target up here
/// to reach identities the ledger can match on.
#[derive(Debug, Clone, Default)]
pub struct SessionDirectory {
    sessions: Arc<RwLock<BTreeMap<String, SessionIdentities>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or refresh an actor's identities
    pub fn join(&self, actor: &Actor) {
        self.sessions
            .write()
            .insert(actor.name.clone(), actor.identities());
    }

    pub fn leave(&self, name: &str) -> bool {
        self.sessions.write().remove(name).is_some()
    }

    /// Exact match first, then a unique case-insensitive prefix
    pub fn find(&self, name: &str) -> Option<(String, SessionIdentities)> {
        let sessions = self.sessions.read();
        if let Some(identities) = sessions.get(name) {
            return Some((name.to_string(), identities.clone()));
        }

        let lowered = name.to_lowercase();
        let mut matches = sessions
            .iter()
            .filter(|(n, _)| n.to_lowercase().starts_with(&lowered));
        match (matches.next(), matches.next()) {
            (Some((n, identities)), None) => Some((n.clone(), identities.clone())),
            _ => None,
        }
    }

    /// Sessions currently logged into `account`
    pub fn by_account(&self, account: &str) -> Vec<String> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, identities)| identities.account_name.as_deref() == Some(account))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
