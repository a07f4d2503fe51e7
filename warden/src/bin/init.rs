//! warden_init - one-time database initialization tool
//!
//! Creates a fresh store with the default groups and an administrator account.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden::config::Settings;

/// warden database initialization tool
#[derive(Parser, Debug)]
#[command(
    name = "warden_init",
    version,
    about = "Initialize a new warden database"
)]
struct Args {
    /// Path to SQLite database file to create (must not exist)
    #[arg(short, long)]
    database: PathBuf,

    /// Optional TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let admin_name = std::env::var("WARDEN_ADMIN_USERNAME")
        .map_err(|_| anyhow::anyhow!("WARDEN_ADMIN_USERNAME environment variable is required"))?;
    let admin_password = std::env::var("WARDEN_ADMIN_PASSWORD")
        .map_err(|_| anyhow::anyhow!("WARDEN_ADMIN_PASSWORD environment variable is required"))?;

    let settings = Settings::load(args.config.as_deref())?;
    warden::init::init_database(&args.database, settings, &admin_name, &admin_password).await?;

    Ok(())
}
