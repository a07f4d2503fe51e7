//! Command dispatch
//!
//! Parses a line, resolves every command answering to its name and runs each
//! one that the actor is allowed to run. Handler failures, including panics,
//! stop at this boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{error, info, warn};

use super::parser::{parse_command, ParsedCommand};
use super::{Command, CommandContext, CommandRegistry};
use crate::error::{Error, Result};
use crate::services::Services;
use crate::session::Actor;

pub const DENIED_MESSAGE: &str = "You do not have access to this command.";
pub const IN_GAME_ONLY_MESSAGE: &str = "You must use this command in-game.";
pub const FAILED_MESSAGE: &str = "Command failed, check logs for more details.";

const REDACTED_ARGS: &str = "(omitted)";

/// What a single dispatch call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The line carried no command prefix
    NotACommand,
    /// The line was prefixed but malformed
    Invalid,
    /// No command or pending response matched
    Unknown,
    /// A pending free-text response callback consumed the line
    Responded,
    /// Every matching command refused the actor
    Denied,
    /// Number of handlers that ran
    Executed(usize),
}

/// Parse and run one line of input for `actor`
pub async fn dispatch(
    services: &Services,
    registry: &CommandRegistry,
    actor: &mut Actor,
    input: &str,
) -> DispatchOutcome {
    let settings = services.settings.get();
    let parsed = match parse_command(input, &settings) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return DispatchOutcome::NotACommand,
        Err(e) => {
            actor.send_error(e.to_string());
            return DispatchOutcome::Invalid;
        }
    };

    let candidates = registry.find(&parsed.name);
    if candidates.is_empty() {
        if let Some(callback) = actor.take_response(&parsed.name) {
            let args = &parsed.args;
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(&mut *actor, args)));
            if let Err(panic) = result {
                error!(
                    token = %parsed.name,
                    actor = %actor.name,
                    panic = %panic_message(panic.as_ref()),
                    "Response callback panicked"
                );
                actor.send_error(FAILED_MESSAGE);
            }
            return DispatchOutcome::Responded;
        }
        actor.send_error(format!(
            "Invalid command entered. Type {}help for a list of valid commands.",
            settings.prefix()
        ));
        return DispatchOutcome::Unknown;
    }

    let mut executed = 0;
    for command in candidates {
        if run_candidate(services, registry, actor, command, &parsed).await {
            executed += 1;
        }
    }

    if executed == 0 {
        DispatchOutcome::Denied
    } else {
        DispatchOutcome::Executed(executed)
    }
}

fn audit_args(command: &Command, parsed: &ParsedCommand) -> String {
    if command.logs_full_args() {
        parsed.args.join(" ")
    } else {
        REDACTED_ARGS.to_string()
    }
}

/// Whether the actor currently holds one of the command's permissions
async fn permitted(services: &Services, actor: &mut Actor, command: &Command) -> Result<bool> {
    // Memberships may have changed since login, or since an earlier candidate ran
    services.refresh(actor).await?;
    let principal = actor.principal(&services.settings.get());
    services
        .groups
        .has_any_permission(&principal, &command.permissions())
        .await
}

/// Check one candidate and run it; returns whether the handler ran
async fn run_candidate(
    services: &Services,
    registry: &CommandRegistry,
    actor: &mut Actor,
    command: &Command,
    parsed: &ParsedCommand,
) -> bool {
    let args = audit_args(command, parsed);

    let allowed = match permitted(services, actor, command).await {
        Ok(allowed) => allowed,
        Err(e) => {
            error!(command = command.name(), error = %e, "Permission check failed");
            actor.send_error(FAILED_MESSAGE);
            return false;
        }
    };

    if !allowed {
        warn!(
            target: "warden::audit",
            actor = %actor.name,
            command = command.name(),
            args = %args,
            outcome = "denied",
            "Command denied"
        );
        actor.send_error(DENIED_MESSAGE);
        return false;
    }

    if !command.allows_non_interactive() && !actor.is_interactive() {
        actor.send_error(IN_GAME_ONLY_MESSAGE);
        return false;
    }

    info!(
        target: "warden::audit",
        actor = %actor.name,
        command = command.name(),
        args = %args,
        outcome = "executed",
        "Command executed"
    );

    let handler = command.handler().clone();
    let result = {
        let mut ctx = CommandContext {
            actor: &mut *actor,
            args: parsed.args.clone(),
            raw: parsed.raw.clone(),
            silent: parsed.silent,
            services,
            registry,
        };
        AssertUnwindSafe(handler.execute(&mut ctx))
            .catch_unwind()
            .await
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => report_error(actor, command, e),
        Err(panic) => {
            error!(
                command = command.name(),
                actor = %actor.name,
                panic = %panic_message(panic.as_ref()),
                "Command handler panicked"
            );
            actor.send_error(FAILED_MESSAGE);
        }
    }
    true
}

fn report_error(actor: &Actor, command: &Command, e: Error) {
    if !e.is_user_facing() {
        error!(command = command.name(), actor = %actor.name, error = ?e, "Command failed");
        actor.send_error(FAILED_MESSAGE);
        return;
    }
    if e.is_operator_error() {
        error!(command = command.name(), actor = %actor.name, error = %e, "Command rejected");
    }
    actor.send_error(e.to_string());
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
