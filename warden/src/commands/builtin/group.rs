//! `/group` administration

use async_trait::async_trait;
use tracing::info;

use super::{page_arg, parse_number, send_page};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};
use crate::groups::GroupUpdate;

const SUBCOMMANDS: &[&str] = &[
    "add <name> [permissions...]",
    "del <name>",
    "rename <group> <new name>",
    "parent <group> [new parent|none]",
    "addperm <group> <permissions...>",
    "delperm <group> <permissions...>",
    "list [page]",
    "listperm <group> [page]",
    "prefix <group> [prefix]",
    "suffix <group> [suffix]",
    "color <group> [r,g,b]",
    "weight <group> [weight]",
];

pub struct GroupCommand;

#[async_trait]
impl CommandHandler for GroupCommand {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let sub = ctx.arg(0).unwrap_or("help").to_lowercase();
        let groups = &ctx.services.groups;

        match sub.as_str() {
            "add" => {
                let name = ctx.require_arg(1, "group add <group name> [permissions...]")?;
                let permissions = ctx.args[2..].to_vec();
                groups.create(name, None, &permissions).await?;
                ctx.actor
                    .send_success(format!("Group {} was added successfully.", name));
            }
            "del" => {
                let name = ctx.require_arg(1, "group del <group name>")?;
                groups.delete(name).await?;
                ctx.actor
                    .send_success(format!("Group {} has been deleted successfully.", name));
            }
            "rename" => {
                let (Some(old), Some(new)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("group rename <group> <new name>"));
                };
                groups.rename(old, new).await?;
                ctx.actor
                    .send_success(format!("Group {} has been renamed to {}.", old, new));
            }
            "parent" => {
                let name = ctx.require_arg(1, "group parent <group name> [new parent group name]")?;
                match ctx.arg(2) {
                    None => {
                        let group = groups
                            .get(name)
                            .await?
                            .ok_or_else(|| Error::not_found("group", name))?;
                        match group.parent {
                            Some(parent) => ctx
                                .actor
                                .send_success(format!("Parent of \"{}\" is \"{}\".", name, parent)),
                            None => ctx
                                .actor
                                .send_success(format!("Group \"{}\" has no parent.", name)),
                        }
                    }
                    Some(_) => {
                        let parent = ctx.rest(2);
                        if parent.eq_ignore_ascii_case("none") {
                            groups.set_parent(name, None).await?;
                            ctx.actor
                                .send_success(format!("Removed parent of group \"{}\".", name));
                        } else {
                            groups.set_parent(name, Some(&parent)).await?;
                            ctx.actor.send_success(format!(
                                "Parent of group \"{}\" set to \"{}\".",
                                name, parent
                            ));
                        }
                    }
                }
            }
            "addperm" | "delperm" => {
                let usage = format!("group {} <group name> <permissions...>", sub);
                let name = ctx.require_arg(1, &usage)?;
                let permissions = ctx.args[2..].to_vec();
                if permissions.is_empty() {
                    return Err(ctx.usage(&usage));
                }
                if sub == "addperm" {
                    groups.add_permissions(name, &permissions).await?;
                    ctx.actor.send_success(format!(
                        "Modified group \"{}\": added {}.",
                        name,
                        permissions.join(", ")
                    ));
                } else {
                    groups.remove_permissions(name, &permissions).await?;
                    ctx.actor.send_success(format!(
                        "Modified group \"{}\": removed {}.",
                        name,
                        permissions.join(", ")
                    ));
                }
                info!("{} changed permissions of group {}", ctx.actor.name, name);
            }
            "list" => {
                let page = page_arg(ctx, 1)?;
                let names: Vec<String> = groups.list().await?.into_iter().map(|g| g.name).collect();
                send_page(ctx, "Groups", &names, page, "group list");
            }
            "listperm" => {
                let name = ctx.require_arg(1, "group listperm <group name> [page]")?;
                let group = groups
                    .get(name)
                    .await?
                    .ok_or_else(|| Error::not_found("group", name))?;
                let page = page_arg(ctx, 2)?;
                let header = format!("Permissions for {}", group.name);
                let more = format!("group listperm {}", group.name);
                send_page(ctx, &header, &group.permission_list(), page, &more);
            }
            "prefix" | "suffix" | "color" | "weight" => {
                let usage = format!("group {} <group name> [value]", sub);
                let name = ctx.require_arg(1, &usage)?;
                let group = groups
                    .get(name)
                    .await?
                    .ok_or_else(|| Error::not_found("group", name))?;

                if ctx.args.len() < 3 {
                    let current = match sub.as_str() {
                        "prefix" => group.prefix,
                        "suffix" => group.suffix,
                        "color" => group.chat_color,
                        _ => group.weight.to_string(),
                    };
                    ctx.actor
                        .send_success(format!("The {} of \"{}\" is \"{}\".", sub, name, current));
                    return Ok(());
                }

                let value = ctx.rest(2);
                let mut update = GroupUpdate::default();
                match sub.as_str() {
                    "prefix" => update.prefix = Some(value.clone()),
                    "suffix" => update.suffix = Some(value.clone()),
                    "color" => update.chat_color = Some(value.clone()),
                    _ => update.weight = Some(parse_number(&value, "weight")?),
                }
                groups.update(name, update).await?;
                ctx.actor.send_success(format!(
                    "The {} of group \"{}\" was set to \"{}\".",
                    sub, name, value
                ));
            }
            "help" => {
                let prefix = ctx.prefix();
                ctx.actor.send_info("Group management subcommands:");
                for line in SUBCOMMANDS {
                    ctx.actor.send_info(format!("{}group {}", prefix, line));
                }
            }
            other => {
                return Err(Error::invalid(format!(
                    "Invalid subcommand \"{}\". Type {}group help for valid subcommands.",
                    other,
                    ctx.prefix()
                )));
            }
        }
        Ok(())
    }
}
