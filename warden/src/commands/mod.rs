//! Command registry
//!
//! A [`Command`] is a set of aliases, the permissions that unlock it (any one
//! suffices, none means public), two flags and a handler. Handlers are unit
//! structs implementing [`CommandHandler`].

pub mod builtin;
pub mod dispatcher;
pub mod parser;

pub use dispatcher::{dispatch, DispatchOutcome};
pub use parser::{parse_command, parse_parameters, ParsedCommand};

use std::sync::Arc;

// async_trait required for dyn-compatibility with Arc<dyn CommandHandler>
use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::groups::Principal;
use crate::services::Services;
use crate::session::Actor;

/// Everything a handler may touch while running
pub struct CommandContext<'a> {
    pub actor: &'a mut Actor,
    pub args: Vec<String>,
    /// Text after the prefix, unparsed
    pub raw: String,
    pub silent: bool,
    pub services: &'a Services,
    pub registry: &'a CommandRegistry,
}

impl CommandContext<'_> {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Argument that must be present, or a usage error
    pub fn require_arg(&self, index: usize, usage: &str) -> Result<&str> {
        self.arg(index).ok_or_else(|| self.usage(usage))
    }

    /// Arguments from `index` on, joined with spaces
    pub fn rest(&self, index: usize) -> String {
        self.args.get(index..).map(|a| a.join(" ")).unwrap_or_default()
    }

    pub fn settings(&self) -> Settings {
        self.services.settings.get()
    }

    pub fn principal(&self) -> Principal {
        self.actor.principal(&self.services.settings.get())
    }

    pub fn prefix(&self) -> String {
        self.services.settings.read(|s| s.prefix().to_string())
    }

    /// "Invalid syntax" error showing the proper form
    pub fn usage(&self, usage: &str) -> Error {
        Error::invalid(format!(
            "Invalid syntax! Proper syntax: {}{}",
            self.prefix(),
            usage
        ))
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()>;
}

/// A registered command
pub struct Command {
    names: Vec<String>,
    permissions: Vec<String>,
    allow_non_interactive: bool,
    log_full_args: bool,
    help: String,
    handler: Arc<dyn CommandHandler>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("names", &self.names)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl Command {
    pub fn new(names: &[&str], handler: impl CommandHandler + 'static) -> Self {
        Self {
            names: names.iter().map(|n| n.to_lowercase()).collect(),
            permissions: Vec::new(),
            allow_non_interactive: true,
            log_full_args: true,
            help: String::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    /// Reject callers without a game session (the console)
    pub fn in_game_only(mut self) -> Self {
        self.allow_non_interactive = false;
        self
    }

    /// Keep arguments (passwords) out of the audit log
    pub fn redact_args(mut self) -> Self {
        self.log_full_args = false;
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = help.to_string();
        self
    }

    /// Primary name
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn permissions(&self) -> Vec<&str> {
        self.permissions.iter().map(String::as_str).collect()
    }

    pub fn allows_non_interactive(&self) -> bool {
        self.allow_non_interactive
    }

    pub fn logs_full_args(&self) -> bool {
        self.log_full_args
    }

    pub fn help_text(&self) -> &str {
        if self.help.is_empty() {
            "No help available."
        } else {
            &self.help
        }
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }
}

/// Commands in registration order
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in commands
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Aliases may be shared; every match runs on dispatch
    pub fn register(&mut self, command: Command) {
        debug!(name = command.name(), aliases = ?command.names(), "Registered command");
        self.commands.push(command);
    }

    /// All commands answering to `name`, in registration order
    pub fn find(&self, name: &str) -> Vec<&Command> {
        self.commands.iter().filter(|c| c.has_alias(name)).collect()
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
