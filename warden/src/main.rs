//! warden - console daemon
//!
//! Opens the store and runs console input through the dispatcher until
//! ctrl-c, end of input or `exit`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden::config::Settings;
use warden::messaging::{Delivery, MessageKind};
use warden::restrictions::RestrictionEvent;
use warden::{Config, Warden};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "warden authorization console")]
struct Args {
    /// SQLite database file; in-memory when omitted
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warden=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_delivery(delivery: &Delivery) {
    let marker = match delivery.kind() {
        MessageKind::Error => "!",
        MessageKind::Warning => "?",
        MessageKind::Success => "+",
        MessageKind::Info => "-",
    };
    match delivery {
        Delivery::Broadcast { text, .. } => println!("{} [all] {}", marker, text),
        Delivery::Send { target, text, .. } => println!("{} [{}] {}", marker, target, text),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let config = Config {
        db_path: args.database,
        settings: Settings::load(args.config.as_deref())?,
    };
    let warden = Warden::new(config).await?;
    let mut console = warden.console();
    let mut shutdown = warden.shutdown_signal();
    let mut events = warden.restriction_events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("Console ready, type exit to stop");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.eq_ignore_ascii_case("exit") {
                    break;
                }
                if !line.is_empty() {
                    warden.dispatch(&mut console, line).await;
                }
                for delivery in warden.messages().drain() {
                    print_delivery(&delivery);
                }
            }
            event = events.recv() => match event {
                Ok(RestrictionEvent::Added(r)) => {
                    info!("{} #{} added for {} {}", r.class.as_str(), r.restriction_id, r.kind, r.identifier);
                }
                Ok(RestrictionEvent::Removed(r)) => {
                    info!("{} #{} lifted for {} {}", r.class.as_str(), r.restriction_id, r.kind, r.identifier);
                }
                Err(e) => warn!("Restriction events: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                warden.shutdown();
            }
            _ = shutdown.changed() => break,
        }
    }

    warden.shutdown();
    info!("warden shutdown complete");
    Ok(())
}
