//! `/user` account administration

use async_trait::async_trait;

use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};
use crate::messaging::MessageKind;

pub struct UserCommand;

impl UserCommand {
    fn help(ctx: &CommandContext<'_>) {
        let prefix = ctx.prefix();
        ctx.actor.send_info("User management command help:");
        for line in [
            "add <username> <password> <group>  -- Adds a specified user",
            "del <username>                     -- Removes a specified user",
            "password <username> <newpassword>  -- Changes a user's password",
            "group <username> <newgroup>        -- Changes a user's group",
            "addperm <username> <permission>    -- Grants a permission to one user",
            "delperm <username> <permission>    -- Revokes a per-user permission",
            "info <username>                    -- Shows a user's details",
        ] {
            ctx.actor.send_info(format!("{}user {}", prefix, line));
        }
    }
}

#[async_trait]
impl CommandHandler for UserCommand {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let sub = ctx.arg(0).unwrap_or("help").to_lowercase();
        let accounts = &ctx.services.accounts;

        match (sub.as_str(), &ctx.args[1.min(ctx.args.len())..]) {
            ("add", [name, password, group]) => {
                let account = accounts.create(name, password, "", Some(group.as_str())).await?;
                ctx.actor.send_success(format!(
                    "Account {} has been added to group {}.",
                    account.name, group
                ));
            }
            ("del", [name]) => {
                accounts.remove(name).await?;
                ctx.actor.send_success("Account removed successfully.");
            }
            ("password", [name, password]) => {
                accounts.set_password(name, password).await?;
                ctx.actor
                    .send_success(format!("Password change succeeded for {}.", name));
            }
            ("group", [name, group]) => {
                accounts.set_groups(name, vec![group.clone()]).await?;
                ctx.actor.send_success(format!(
                    "Account {} has been changed to group {}.",
                    name, group
                ));
                for session in ctx.services.sessions.by_account(name) {
                    ctx.services.messages.send(
                        &session,
                        MessageKind::Success,
                        format!("{} has changed your group to {}.", ctx.actor.name, group),
                    );
                }
            }
            ("addperm", [name, permission]) => {
                accounts.add_permission(name, permission).await?;
                ctx.actor
                    .send_success(format!("Granted {} to {}.", permission, name));
            }
            ("delperm", [name, permission]) => {
                accounts.remove_permission(name, permission).await?;
                ctx.actor
                    .send_success(format!("Revoked {} from {}.", permission, name));
            }
            ("info", [name]) => {
                let account = accounts
                    .get_by_name(name)
                    .await?
                    .ok_or_else(|| Error::not_found("account", name.as_str()))?;
                ctx.actor.send_success(format!(
                    "{} (#{}) registered {}",
                    account.name, account.account_id, account.registered_at
                ));
                ctx.actor
                    .send_info(format!("Groups: {}", account.groups.join(", ")));
                if !account.permissions.is_empty() {
                    ctx.actor
                        .send_info(format!("Permissions: {}", account.permissions.join(", ")));
                }
                ctx.actor
                    .send_info(format!("Last accessed: {}", account.last_accessed));
            }
            ("help", _) => Self::help(ctx),
            _ => {
                return Err(Error::invalid(format!(
                    "Invalid user syntax. Try {}user help.",
                    ctx.prefix()
                )));
            }
        }
        Ok(())
    }
}
