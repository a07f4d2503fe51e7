use async_trait::async_trait;

use super::{page_arg, send_page};
use crate::commands::dispatcher::DENIED_MESSAGE;
use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};

/// `/help [page]` or `/help <command>`
pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        if ctx.args.len() > 1 {
            return Err(ctx.usage("help <command/page>"));
        }

        let prefix = ctx.prefix();
        let principal = ctx.principal();

        let topic = ctx.arg(0).map(str::to_string);
        let topic = match topic {
            Some(t) if t.parse::<usize>().is_err() => t,
            _ => {
                let page = page_arg(ctx, 0)?;
                let mut names = Vec::new();
                for command in ctx.registry.commands() {
                    if ctx
                        .services
                        .groups
                        .has_any_permission(&principal, &command.permissions())
                        .await?
                    {
                        names.push(format!("{}{}", prefix, command.name()));
                    }
                }
                send_page(ctx, "Commands", &names, page, "help");
                return Ok(());
            }
        };

        let name = topic.strip_prefix(prefix.as_str()).unwrap_or(&topic).to_lowercase();
        let Some(command) = ctx.registry.find(&name).into_iter().next() else {
            return Err(Error::invalid("Invalid command."));
        };
        if !ctx
            .services
            .groups
            .has_any_permission(&principal, &command.permissions())
            .await?
        {
            return Err(Error::Unauthorized(DENIED_MESSAGE.to_string()));
        }

        ctx.actor
            .send_success(format!("{}{} help:", prefix, command.name()));
        ctx.actor.send_info(command.help_text().to_string());
        Ok(())
    }
}
