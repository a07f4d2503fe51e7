//! `/region` administration

use async_trait::async_trait;

use super::{page_arg, parse_bool, parse_number, send_page};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};
use crate::regions::{Direction, Rect, Region};

const SUBCOMMANDS: &[&str] = &[
    "define <name> <x> <y> <width> <height> [z]",
    "delete <name>",
    "rename <region> <new name>",
    "resize <region> <u|r|d|l> <amount>",
    "move <region> <x> <y> <width> <height>",
    "allow <account> <region>",
    "remove <account> <region>",
    "allowg <group> <region>",
    "removeg <group> <region>",
    "z <region> <z>",
    "protect <region> <true|false>",
    "owner <region> <account>",
    "info <region>",
    "list [page]",
    "here",
];

fn rect_args(ctx: &CommandContext<'_>, from: usize, usage: &str) -> Result<Rect> {
    let mut values = [0i32; 4];
    for (offset, slot) in values.iter_mut().enumerate() {
        let raw = ctx.arg(from + offset).ok_or_else(|| ctx.usage(usage))?;
        *slot = parse_number(raw, "coordinate")?;
    }
    Rect::new(values[0], values[1], values[2], values[3])
}

pub struct RegionCommand;

impl RegionCommand {
    async fn info(ctx: &CommandContext<'_>, region: &Region) -> Result<()> {
        ctx.actor.send_success(format!(
            "Region {} (#{}) at {}, z {}",
            region.name, region.region_id, region.area, region.z
        ));
        ctx.actor.send_info(format!(
            "Owner: {}, protected: {}",
            region.owner, region.restricted
        ));

        let mut names = Vec::new();
        for id in &region.allowed_identities {
            match ctx.services.accounts.get_by_id(*id).await? {
                Some(account) => names.push(account.name),
                None => names.push(format!("#{}", id)),
            }
        }
        if !names.is_empty() {
            ctx.actor
                .send_info(format!("Allowed users: {}", names.join(", ")));
        }
        if !region.allowed_groups.is_empty() {
            ctx.actor
                .send_info(format!("Allowed groups: {}", region.allowed_groups.join(", ")));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for RegionCommand {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let sub = ctx.arg(0).unwrap_or("help").to_lowercase();
        let regions = &ctx.services.regions;

        match sub.as_str() {
            "define" => {
                const USAGE: &str = "region define <name> <x> <y> <width> <height> [z]";
                let name = ctx.require_arg(1, USAGE)?;
                let area = rect_args(ctx, 2, USAGE)?;
                let z = match ctx.arg(6) {
                    Some(raw) => parse_number(raw, "z")?,
                    None => 0,
                };
                let owner = ctx
                    .actor
                    .account_name()
                    .unwrap_or(ctx.actor.name.as_str())
                    .to_string();
                let region = regions.create(name, area, &owner, z).await?;
                ctx.actor
                    .send_success(format!("Set region {} at {}.", region.name, region.area));
            }
            "delete" => {
                let name = ctx.require_arg(1, "region delete <name>")?;
                let region = regions.delete(name).await?;
                ctx.actor
                    .send_success(format!("Deleted region \"{}\".", region.name));
            }
            "rename" => {
                let (Some(old), Some(new)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("region rename <region> <new name>"));
                };
                regions.rename(old, new).await?;
                ctx.actor
                    .send_success(format!("Region renamed successfully to {}.", new));
            }
            "resize" | "expand" => {
                const USAGE: &str = "region resize <region> <u|r|d|l> <amount>";
                let (Some(name), Some(direction), Some(amount)) =
                    (ctx.arg(1), ctx.arg(2), ctx.arg(3))
                else {
                    return Err(ctx.usage(USAGE));
                };
                let direction: Direction = direction.parse()?;
                let amount = parse_number(amount, "amount")?;
                let region = regions.resize(name, amount, direction).await?;
                ctx.actor
                    .send_success(format!("Resized region {} to {}.", region.name, region.area));
            }
            "move" => {
                const USAGE: &str = "region move <region> <x> <y> <width> <height>";
                let name = ctx.require_arg(1, USAGE)?;
                let area = rect_args(ctx, 2, USAGE)?;
                let region = regions.reposition(name, area).await?;
                ctx.actor
                    .send_success(format!("Moved region {} to {}.", region.name, region.area));
            }
            "allow" | "remove" => {
                let usage = format!("region {} <account> <region>", sub);
                let (Some(user), Some(name)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage(&usage));
                };
                let account = ctx
                    .services
                    .accounts
                    .get_by_name(user)
                    .await?
                    .ok_or_else(|| Error::not_found("account", user))?;
                if sub == "allow" {
                    regions.allow_identity(name, account.account_id).await?;
                    ctx.actor
                        .send_success(format!("Added user {} to {}.", account.name, name));
                } else {
                    regions.remove_identity(name, account.account_id).await?;
                    ctx.actor
                        .send_success(format!("Removed user {} from {}.", account.name, name));
                }
            }
            "allowg" | "removeg" => {
                let usage = format!("region {} <group> <region>", sub);
                let (Some(group), Some(name)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage(&usage));
                };
                if sub == "allowg" {
                    regions.allow_group(name, group).await?;
                    ctx.actor
                        .send_success(format!("Added group {} to {}.", group, name));
                } else {
                    regions.remove_group(name, group).await?;
                    ctx.actor
                        .send_success(format!("Removed group {} from {}.", group, name));
                }
            }
            "z" => {
                let (Some(name), Some(z)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("region z <region> <z>"));
                };
                let region = regions.set_z(name, parse_number(z, "z")?).await?;
                ctx.actor
                    .send_success(format!("Region's z is now {}.", region.z));
            }
            "protect" => {
                let (Some(name), Some(flag)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("region protect <region> <true|false>"));
                };
                let region = regions.set_restricted(name, parse_bool(flag)?).await?;
                let state = if region.restricted { "protected" } else { "unprotected" };
                ctx.actor
                    .send_success(format!("Marked region {} as {}.", region.name, state));
            }
            "owner" => {
                let (Some(name), Some(user)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("region owner <region> <account>"));
                };
                if ctx.services.accounts.get_by_name(user).await?.is_none() {
                    return Err(Error::not_found("account", user));
                }
                let region = regions.change_owner(name, user).await?;
                ctx.actor.send_success(format!(
                    "Owner of region {} changed to {}.",
                    region.name, region.owner
                ));
            }
            "info" => {
                let name = ctx.require_arg(1, "region info <region>")?;
                let region = regions
                    .find(name)
                    .await?
                    .ok_or_else(|| Error::not_found("region", name))?;
                Self::info(ctx, &region).await?;
            }
            "list" => {
                let page = page_arg(ctx, 1)?;
                let names: Vec<String> =
                    regions.list().await?.into_iter().map(|r| r.name).collect();
                send_page(ctx, "Regions", &names, page, "region list");
            }
            "here" => {
                let Some((x, y)) = ctx.actor.position else {
                    return Err(Error::invalid("Your position is unknown."));
                };
                let found = regions.query_point(x, y).await?;
                if found.is_empty() {
                    ctx.actor
                        .send_info(format!("You are not in a region at ({}, {}).", x, y));
                } else {
                    let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
                    ctx.actor.send_info(format!(
                        "Regions at ({}, {}): {}",
                        x,
                        y,
                        names.join(", ")
                    ));
                }
            }
            "help" => {
                let prefix = ctx.prefix();
                ctx.actor.send_info("Region management subcommands:");
                for line in SUBCOMMANDS {
                    ctx.actor.send_info(format!("{}region {}", prefix, line));
                }
            }
            other => {
                return Err(Error::invalid(format!(
                    "Invalid subcommand \"{}\". Type {}region help for valid subcommands.",
                    other,
                    ctx.prefix()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{dispatch, CommandRegistry};
    use crate::db::test_utils::{test_pool, test_settings};
    use crate::services::Services;
    use crate::session::Actor;

    fn last(actor: &Actor) -> String {
        actor
            .messages()
            .drain_for(&actor.name)
            .last()
            .map(|m| m.text().to_string())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_region_commands_drive_can_act() {
        let services = Services::new(test_pool().await, test_settings());
        services.groups.ensure_default_groups().await.unwrap();
        let registry = CommandRegistry::with_builtins();
        let mut console = Actor::console(services.messages.clone());

        services.accounts.register("dana", "hunter22", "").await.unwrap();
        let mut dana = Actor::player("dana", None, None, services.messages.clone());
        services.login(&mut dana, "dana", "hunter22").await.unwrap();

        dispatch(&services, &registry, &mut console, "/region define spawn 0 0 10 10").await;
        assert_eq!(last(&console), "Set region spawn at (0, 0) 10x10.");
        assert!(!services.can_act(&dana, 5, 5, "canbuild").await.unwrap());
        assert!(services.can_act(&dana, 11, 5, "canbuild").await.unwrap());

        dispatch(&services, &registry, &mut console, "/region allow dana spawn").await;
        assert!(services.can_act(&dana, 5, 5, "canbuild").await.unwrap());

        dispatch(&services, &registry, &mut console, "/region remove dana spawn").await;
        dispatch(&services, &registry, &mut console, "/region allowg default spawn").await;
        assert!(services.can_act(&dana, 5, 5, "canbuild").await.unwrap());

        dispatch(&services, &registry, &mut console, "/region resize spawn r 5").await;
        assert_eq!(last(&console), "Resized region spawn to (0, 0) 15x10.");

        dispatch(&services, &registry, &mut console, "/region resize spawn l -20").await;
        assert!(last(&console).contains("negative"));
    }

    #[tokio::test]
    async fn test_region_here_needs_a_position() {
        let services = Services::new(test_pool().await, test_settings());
        services.groups.ensure_default_groups().await.unwrap();
        let registry = CommandRegistry::with_builtins();
        let mut console = Actor::console(services.messages.clone());

        dispatch(&services, &registry, &mut console, "/region here").await;
        assert_eq!(last(&console), "Your position is unknown.");

        dispatch(&services, &registry, &mut console, "/region define a 0 0 4 4 1").await;
        console.position = Some((4, 4));
        dispatch(&services, &registry, &mut console, "/region here").await;
        assert_eq!(last(&console), "Regions at (4, 4): a");
    }
}
