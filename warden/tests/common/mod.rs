//! Common test utilities - WardenTest harness for end-to-end testing

#![allow(dead_code)]

use anyhow::Result;
use warden::commands::DispatchOutcome;
use warden::session::Actor;
use warden::{Config, Warden};

/// A fresh in-memory warden with the built-in commands and default groups
pub struct WardenTest {
    pub warden: Warden,
}

impl WardenTest {
    pub async fn start() -> Result<Self> {
        let warden = Warden::new(Config::default()).await?;
        Ok(Self { warden })
    }

    pub fn console(&self) -> Actor {
        self.warden.console()
    }

    /// A connected, logged-out player
    pub async fn guest(&self, name: &str, uuid: &str, ip: &str) -> Result<Actor> {
        let actor = self.warden.player(name, Some(uuid), Some(ip));
        self.warden.connect(&actor).await?;
        Ok(actor)
    }

    /// Register an account and log a new session into it
    pub async fn player(&self, name: &str, password: &str) -> Result<Actor> {
        self.warden
            .services()
            .accounts
            .register(name, password, "")
            .await?;
        let ip = format!("10.0.0.{}", self.warden.services().sessions.len() + 1);
        let mut actor = self.guest(name, &format!("dev-{}", name), &ip).await?;
        self.warden.login(&mut actor, name, password).await?;
        Ok(actor)
    }

    /// Dispatch a line and collect what the actor was told
    pub async fn run(&self, actor: &mut Actor, line: &str) -> (DispatchOutcome, Vec<String>) {
        let outcome = self.warden.dispatch(actor, line).await;
        let texts = self
            .warden
            .messages()
            .drain_for(&actor.name)
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        (outcome, texts)
    }

    /// Last line the actor was told
    pub async fn last(&self, actor: &mut Actor, line: &str) -> String {
        let (_, texts) = self.run(actor, line).await;
        texts.last().cloned().unwrap_or_default()
    }
}
