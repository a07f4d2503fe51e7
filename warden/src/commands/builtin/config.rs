//! `/config get|set|list`

use async_trait::async_trait;

use super::{page_arg, send_page};
use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};

pub struct ConfigCommand;

#[async_trait]
impl CommandHandler for ConfigCommand {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let sub = ctx.arg(0).unwrap_or_default().to_lowercase();
        let registry = &ctx.services.config;

        match sub.as_str() {
            "get" | "value" => {
                let name = ctx.require_arg(1, "config get <key>")?;
                let key = registry
                    .get(name)
                    .ok_or_else(|| Error::not_found("config key", name))?;
                let value = ctx.services.settings.read(|s| key.value(s));
                ctx.actor.send_success(format!("{} is {}", key.name, value));
            }
            "set" | "setvalue" => {
                let (Some(name), Some(_)) = (ctx.arg(1), ctx.arg(2)) else {
                    return Err(ctx.usage("config set <key> <value>"));
                };
                let raw = ctx.rest(2);
                let value = registry
                    .set(&ctx.services.settings, &ctx.services.pool, name, &raw)
                    .await?;
                ctx.actor.send_success(format!("Set {} to {}", name, value));
            }
            "list" => {
                let page = page_arg(ctx, 1)?;
                let settings = ctx.settings();
                let lines: Vec<String> = registry
                    .keys()
                    .map(|k| format!("{} = {} ({})", k.name, k.value(&settings), k.description))
                    .collect();
                send_page(ctx, "Settings", &lines, page, "config list");
            }
            _ => {
                return Err(Error::invalid(format!(
                    "Proper syntax: {}config <get|set|list>",
                    ctx.prefix()
                )));
            }
        }
        Ok(())
    }
}
