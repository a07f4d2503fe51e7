//! Session account commands: register, login, logout, password

use async_trait::async_trait;
use tracing::info;

use crate::commands::{CommandContext, CommandHandler};
use crate::error::{Error, Result};

/// Name and password from `<password>` or `<name> <password>`
fn credentials<'c>(ctx: &'c CommandContext<'_>, usage: &str) -> Result<(&'c str, &'c str)> {
    match ctx.args.as_slice() {
        [password] => Ok((ctx.actor.name.as_str(), password.as_str())),
        [name, password] => Ok((name.as_str(), password.as_str())),
        _ => Err(ctx.usage(usage)),
    }
}

pub struct Register;

#[async_trait]
impl CommandHandler for Register {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let (name, password) = credentials(ctx, "register <password>")?;
        let uuid = ctx.actor.uuid.clone().unwrap_or_default();

        let account = ctx.services.accounts.register(name, password, &uuid).await?;

        info!("{} registered an account: {}", ctx.actor.name, account.name);
        ctx.actor.send_success(format!(
            "Your account, \"{}\", has been registered.",
            account.name
        ));
        ctx.actor.send_info(format!(
            "Type {}login <password> to log-in to your account.",
            ctx.prefix()
        ));
        Ok(())
    }
}

pub struct Login;

#[async_trait]
impl CommandHandler for Login {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let (name, password) = {
            let (name, password) = credentials(ctx, "login <password>")?;
            (name.to_string(), password.to_string())
        };

        let account = ctx.services.login(ctx.actor, &name, &password).await?;
        ctx.actor
            .send_success(format!("Authenticated as {} successfully.", account.name));
        Ok(())
    }
}

pub struct Logout;

#[async_trait]
impl CommandHandler for Logout {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        if ctx.services.logout(ctx.actor).is_none() {
            return Err(Error::invalid(
                "You are not logged-in. Therefore, you cannot logout.",
            ));
        }
        ctx.actor
            .send_success("You have been successfully logged out of your account.");
        Ok(())
    }
}

/// `/password <old> <new>`
pub struct Password;

#[async_trait]
impl CommandHandler for Password {
    async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<()> {
        let Some(name) = ctx.actor.account_name().map(str::to_string) else {
            return Err(Error::invalid(
                "You must be logged in to change your password.",
            ));
        };
        let [old, new] = ctx.args.as_slice() else {
            return Err(ctx.usage("password <old password> <new password>"));
        };

        ctx.services.accounts.verify_password(&name, old).await?;
        let account = ctx.services.accounts.set_password(&name, new).await?;
        ctx.actor.account = Some(account);

        info!("{} changed the password for account {}", ctx.actor.name, name);
        ctx.actor.send_success("You changed your password.");
        Ok(())
    }
}
