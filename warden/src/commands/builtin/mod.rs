//! Built-in commands
//!
//! Each command is a unit struct implementing [`CommandHandler`]; administrative
//! commands take a subcommand as their first argument.

mod account;
mod config;
mod group;
mod help;
mod moderation;
mod region;
mod user;

use super::{Command, CommandContext, CommandRegistry};
use crate::error::{Error, Result};
use crate::messaging::MessageKind;
use crate::permissions::{
    BAN, CAN_CHANGE_PASSWORD, CAN_LOGIN, CAN_LOGOUT, CAN_REGISTER, CONFIG, MANAGE_GROUP,
    MANAGE_REGION, MANAGE_USER, MUTE,
};

const PER_PAGE: usize = 10;

/// Register every built-in command
pub fn register_all(registry: &mut CommandRegistry) {
    registry.register(
        Command::new(&["help"], help::Help).help("Lists commands or shows help for one command."),
    );

    registry.register(
        Command::new(&["register"], account::Register)
            .permission(CAN_REGISTER)
            .in_game_only()
            .redact_args()
            .help("Registers you an account."),
    );
    registry.register(
        Command::new(&["login"], account::Login)
            .permission(CAN_LOGIN)
            .in_game_only()
            .redact_args()
            .help("Logs you into an account."),
    );
    registry.register(
        Command::new(&["logout"], account::Logout)
            .permission(CAN_LOGOUT)
            .in_game_only()
            .help("Logs you out of your current account."),
    );
    registry.register(
        Command::new(&["password"], account::Password)
            .permission(CAN_CHANGE_PASSWORD)
            .in_game_only()
            .redact_args()
            .help("Changes your account's password."),
    );

    registry.register(
        Command::new(&["group"], group::GroupCommand)
            .permission(MANAGE_GROUP)
            .help("Manages groups."),
    );
    registry.register(
        Command::new(&["user"], user::UserCommand)
            .permission(MANAGE_USER)
            .redact_args()
            .help("Manages user accounts."),
    );

    registry.register(
        Command::new(&["ban"], moderation::Ban)
            .permission(BAN)
            .help("Manages player bans."),
    );
    registry.register(
        Command::new(&["mute"], moderation::Mute)
            .permission(MUTE)
            .help("Prevents a player from talking."),
    );
    registry.register(
        Command::new(&["unmute"], moderation::Unmute)
            .permission(MUTE)
            .help("Lets a muted player talk again."),
    );
    registry.register(
        Command::new(&["mutes"], moderation::ListMutes)
            .permission(MUTE)
            .help("Lists active and expired mutes."),
    );

    registry.register(
        Command::new(&["region"], region::RegionCommand)
            .permission(MANAGE_REGION)
            .help("Manages regions."),
    );

    registry.register(
        Command::new(&["config"], config::ConfigCommand)
            .permission(CONFIG)
            .help("Reads or changes server settings."),
    );
}

/// Page number at `index`, 1 when absent
fn page_arg(ctx: &CommandContext<'_>, index: usize) -> Result<usize> {
    match ctx.arg(index) {
        None => Ok(1),
        Some(raw) => match raw.parse::<usize>() {
            Ok(page) if page > 0 => Ok(page),
            _ => Err(Error::invalid(format!("\"{}\" is not a valid page number.", raw))),
        },
    }
}

/// Send one page of `lines` with a header and a "more" footer
fn send_page(ctx: &CommandContext<'_>, header: &str, lines: &[String], page: usize, more: &str) {
    if lines.is_empty() {
        ctx.actor.send_info(format!("{}: none.", header));
        return;
    }

    let pages = lines.len().div_ceil(PER_PAGE);
    if page > pages {
        ctx.actor
            .send_error(format!("Page {} does not exist, there are {}.", page, pages));
        return;
    }

    ctx.actor
        .send_success(format!("{} ({}/{}):", header, page, pages));
    for line in lines.iter().skip((page - 1) * PER_PAGE).take(PER_PAGE) {
        ctx.actor.send_info(line.clone());
    }
    if page < pages {
        ctx.actor
            .send_info(format!("Type {}{} {} for more.", ctx.prefix(), more, page + 1));
    }
}

/// Tell everyone, or only the issuer when the command was silent
fn announce(ctx: &CommandContext<'_>, text: String) {
    if ctx.silent {
        ctx.actor.send_success(text);
    } else {
        ctx.services.messages.broadcast(MessageKind::Info, text);
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::invalid(format!("Invalid {} \"{}\".", what, raw)))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::invalid(format!(
            "Invalid value \"{}\", expected true or false.",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_every_builtin() {
        let registry = CommandRegistry::with_builtins();
        for name in [
            "help", "register", "login", "logout", "password", "group", "user", "ban", "mute",
            "unmute", "mutes", "region", "config",
        ] {
            assert_eq!(registry.find(name).len(), 1, "{}", name);
        }

        let login = &registry.find("login")[0];
        assert!(!login.allows_non_interactive());
        assert!(!login.logs_full_args());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_number::<i32>(" 12 ", "size").unwrap(), 12);
        assert!(parse_number::<i32>("twelve", "size").is_err());
        assert!(parse_bool("ON").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
