//! Bans and mutes

use async_trait::async_trait;
use chrono::Duration;

use super::{announce, page_arg, PER_PAGE};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};
use crate::messaging::MessageKind;
use crate::restrictions::{
    format_remaining, parse_duration, IdentifierKind, Restriction, RestrictionClass, Selector,
};

const DEFAULT_BAN_REASON: &str = "Misbehaviour.";
const DEFAULT_MUTE_REASON: &str = "Muted.";

fn issuer(ctx: &CommandContext<'_>) -> String {
    ctx.actor
        .account_name()
        .unwrap_or(ctx.actor.name.as_str())
        .to_string()
}

fn expiry_text(expiry: Option<Duration>) -> String {
    match expiry {
        None => "never".to_string(),
        Some(d) => format!("in {}", format_remaining(d)),
    }
}

fn describe(restriction: &Restriction) -> String {
    format!(
        "#{} {} {} by {}: {} (expires: {})",
        restriction.restriction_id,
        restriction.kind,
        restriction.identifier,
        restriction.issuer,
        restriction.reason,
        restriction.expiry_display()
    )
}

/// One page of a class, newest first
async fn send_restrictions(
    ctx: &CommandContext<'_>,
    class: RestrictionClass,
    page: usize,
    more: &str,
) -> Result<()> {
    let ledger = &ctx.services.restrictions;
    let total = usize::try_from(ledger.count(class).await?).unwrap_or_default();
    let title = format!("{}s", class.as_str());
    if total == 0 {
        ctx.actor.send_info(format!("There are no {}.", title));
        return Ok(());
    }

    let pages = total.div_ceil(PER_PAGE);
    if page > pages {
        return Err(Error::invalid(format!(
            "Page {} does not exist, there are {}.",
            page, pages
        )));
    }

    let page_u32 = u32::try_from(page).unwrap_or(u32::MAX);
    let per_page = u32::try_from(PER_PAGE).unwrap_or(u32::MAX);
    ctx.actor
        .send_success(format!("{} ({}/{}):", title, page, pages));
    for restriction in ledger.list(class, page_u32, per_page).await? {
        ctx.actor.send_info(describe(&restriction));
    }
    if page < pages {
        ctx.actor
            .send_info(format!("Type {}{} {} for more.", ctx.prefix(), more, page + 1));
    }
    Ok(())
}

/// `/ban add|del|list|details`
pub struct Ban;

impl Ban {
    async fn add(ctx: &CommandContext<'_>) -> Result<()> {
        const USAGE: &str = "ban add <player|account|uuid|ip> <value> [reason] [duration]";
        let (Some(kind), Some(target)) = (ctx.arg(1), ctx.arg(2)) else {
            return Err(ctx.usage(USAGE));
        };
        let reason = ctx.arg(3).unwrap_or(DEFAULT_BAN_REASON);
        let expiry = parse_duration(ctx.arg(4).unwrap_or_default())?;
        let ledger = &ctx.services.restrictions;
        let issuer = issuer(ctx);

        let written = match kind.to_lowercase().as_str() {
            "player" => {
                // Online sessions are banned on every identity they expose
                if let Some((name, identities)) = ctx.services.sessions.find(target) {
                    let written = ledger
                        .restrict_session(RestrictionClass::Ban, &identities, reason, &issuer, expiry)
                        .await?;
                    if let Some(first) = written.first() {
                        ctx.services
                            .messages
                            .send(&name, MessageKind::Error, first.notice());
                    }
                    written
                } else if ctx.services.accounts.get_by_name(target).await?.is_some() {
                    vec![
                        ledger
                            .add(RestrictionClass::Ban, IdentifierKind::AccountName, target, reason, &issuer, expiry)
                            .await?,
                    ]
                } else {
                    return Err(Error::invalid("No account or player found with that name."));
                }
            }
            "account" => {
                if ctx.services.accounts.get_by_name(target).await?.is_none() {
                    return Err(Error::not_found("account", target));
                }
                vec![
                    ledger
                        .add(RestrictionClass::Ban, IdentifierKind::AccountName, target, reason, &issuer, expiry)
                        .await?,
                ]
            }
            "uuid" | "ip" => {
                let kind: IdentifierKind = kind.parse()?;
                vec![
                    ledger
                        .add(RestrictionClass::Ban, kind, target, reason, &issuer, expiry)
                        .await?,
                ]
            }
            _ => return Err(ctx.usage(USAGE)),
        };

        let ids: Vec<String> = written
            .iter()
            .map(|r| format!("#{}", r.restriction_id))
            .collect();
        ctx.actor.send_success(format!(
            "The {} ({}) has been banned ({}). Reason: {} Expiry: {}",
            kind,
            target,
            ids.join(", "),
            reason,
            expiry_text(expiry)
        ));
        announce(ctx, format!("{} was banned by {}.", target, issuer));
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Ban {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let sub = ctx.arg(0).unwrap_or("help").to_lowercase();
        match sub.as_str() {
            "add" => Self::add(ctx).await,
            "del" => {
                let target = ctx.require_arg(1, "ban del <ban id|identifier>")?;
                let removed = ctx
                    .services
                    .restrictions
                    .remove(RestrictionClass::Ban, &Selector::parse(target))
                    .await?;
                for restriction in &removed {
                    ctx.actor.send_success(format!(
                        "Ban #{} ({} {}) has been removed.",
                        restriction.restriction_id, restriction.kind, restriction.identifier
                    ));
                }
                Ok(())
            }
            "list" => {
                let page = page_arg(ctx, 1)?;
                send_restrictions(ctx, RestrictionClass::Ban, page, "ban list").await
            }
            "details" => {
                let raw = ctx.require_arg(1, "ban details <ban id>")?;
                let Selector::Id(id) = Selector::parse(raw) else {
                    return Err(Error::invalid(format!("Invalid ban id \"{}\".", raw)));
                };
                let ban = ctx
                    .services
                    .restrictions
                    .get(RestrictionClass::Ban, id)
                    .await?
                    .ok_or_else(|| Error::not_found("ban", format!("#{}", id)))?;
                ctx.actor.send_success(describe(&ban));
                ctx.actor
                    .send_info(format!("Banned at {}", ban.created_at.to_rfc3339()));
                Ok(())
            }
            "help" => {
                let prefix = ctx.prefix();
                for line in [
                    "add <player|account|uuid|ip> <value> [reason] [duration]",
                    "del <ban id|identifier>",
                    "list [page]",
                    "details <ban id>",
                ] {
                    ctx.actor.send_info(format!("{}ban {}", prefix, line));
                }
                ctx.actor
                    .send_info("Durations look like 1d2h3m4s; -1 or nothing means never.");
                Ok(())
            }
            other => Err(Error::invalid(format!(
                "Invalid subcommand \"{}\". Type {}ban help for valid subcommands.",
                other,
                ctx.prefix()
            ))),
        }
    }
}

/// `/mute <player> [duration] [reason...]`
pub struct Mute;

#[async_trait]
impl CommandHandler for Mute {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let target = ctx.require_arg(0, "mute <player> [duration] [reason]")?;
        let Some((name, identities)) = ctx.services.sessions.find(target) else {
            return Err(Error::invalid("Invalid player!"));
        };

        let ledger = &ctx.services.restrictions;
        if ledger
            .is_restricted(RestrictionClass::Mute, &identities)
            .await?
            .is_some()
        {
            return Err(Error::invalid("Player is already muted!"));
        }

        let expiry = parse_duration(ctx.arg(1).unwrap_or_default())?;
        let reason = match ctx.rest(2) {
            r if r.is_empty() => DEFAULT_MUTE_REASON.to_string(),
            r => r,
        };
        let issuer = issuer(ctx);

        ledger
            .restrict_session(RestrictionClass::Mute, &identities, &reason, &issuer, expiry)
            .await?;

        ctx.services.messages.send(
            &name,
            MessageKind::Warning,
            format!("You have been muted by {}: {}", issuer, reason),
        );
        announce(
            ctx,
            format!(
                "{} has been muted by {}, expires {}.",
                name,
                ctx.actor.name,
                expiry_text(expiry)
            ),
        );
        Ok(())
    }
}

/// `/unmute <player|identifier|#id>`
pub struct Unmute;

#[async_trait]
impl CommandHandler for Unmute {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let input = ctx.require_arg(0, "unmute <name/ip/uuid>")?;
        let ledger = &ctx.services.restrictions;

        let (label, removed) = match ctx.services.sessions.find(input) {
            Some((name, identities)) => {
                let mut removed = 0;
                for (_, value) in identities.axes() {
                    match ledger
                        .remove(RestrictionClass::Mute, &Selector::Identifier(value.to_string()))
                        .await
                    {
                        Ok(entries) => removed += entries.len(),
                        Err(Error::NotFound { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                if removed > 0 {
                    ctx.services
                        .messages
                        .send(&name, MessageKind::Info, "You have been unmuted.");
                }
                (name, removed)
            }
            None => {
                let removed = match ledger
                    .remove(RestrictionClass::Mute, &Selector::parse(input))
                    .await
                {
                    Ok(entries) => entries.len(),
                    Err(Error::NotFound { .. }) => 0,
                    Err(e) => return Err(e),
                };
                (input.to_string(), removed)
            }
        };

        if removed == 0 {
            return Err(Error::invalid(format!("Failed to unmute '{}'.", label)));
        }
        ctx.actor.send_success(format!("Unmuted '{}'.", label));
        Ok(())
    }
}

/// `/mutes [page]`
pub struct ListMutes;

#[async_trait]
impl CommandHandler for ListMutes {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let page = page_arg(ctx, 0)?;
        send_restrictions(ctx, RestrictionClass::Mute, page, "mutes").await
    }
}
