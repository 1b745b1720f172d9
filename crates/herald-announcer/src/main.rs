//! Herald announcer binary.
//!
//! Watches a set of Roblox universes and posts visit milestones, new places
//! and update notices to Discord channels. Wires the Roblox HTTP source, the
//! Discord REST notifier and the JSON state file into the reconciliation
//! service, then polls until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `herald.yaml` (or `HERALD_CONFIG`) plus env
//! 3. Validate settings and require `DISCORD_TOKEN`
//! 4. Verify the bot token with Discord
//! 5. Open the state file (a corrupt file is fatal)
//! 6. Start polling: first pass immediately, then every poll interval
//! 7. Stop cleanly on Ctrl-C or SIGTERM

mod discord;
mod error;
mod roblox;

use std::path::Path;
use std::sync::Arc;

use herald_core::{HeraldConfig, IntervalTicker, ReconciliationService};
use herald_store::JsonFileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::discord::DiscordNotifier;
use crate::error::AnnouncerError;
use crate::roblox::RobloxClient;

/// Config file read when `HERALD_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "herald.yaml";

/// Application entry point for the announcer.
///
/// # Errors
///
/// Returns an error if any startup step fails or shutdown is unclean.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!("herald-announcer starting");

    run().await?;

    info!("herald-announcer shutdown complete");
    Ok(())
}

/// Set up the tracing subscriber. `HERALD_LOG_FORMAT=json` switches to
/// JSON lines; the level filter comes from `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HERALD_LOG_FORMAT").is_ok_and(|format| format == "json");

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

async fn run() -> Result<(), AnnouncerError> {
    // 2. Load configuration.
    let config_path =
        std::env::var("HERALD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = HeraldConfig::from_file_or_env(Path::new(&config_path))?;

    // 3. Validate.
    let settings = config.validate()?;
    let token = config
        .discord
        .token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .ok_or(AnnouncerError::MissingToken)?;
    info!(
        config_path = %config_path,
        games = settings.games.len(),
        milestone_frequency = settings.frequency.get(),
        poll_interval_secs = settings.poll_interval.as_secs(),
        state_path = %config.state_path,
        "Configuration loaded"
    );

    // 4. Connect to Discord.
    let notifier = DiscordNotifier::connect(&config.discord, token).await?;
    let source = RobloxClient::new(&config.roblox)?;

    // 5. Open state.
    let store = JsonFileStore::new(&config.state_path);
    let poll_interval = settings.poll_interval;
    let service = Arc::new(ReconciliationService::open(settings, source, notifier, store).await?);
    info!(
        bot = %service.notifier().bot().username,
        "Announcer ready"
    );

    // 6. Poll.
    let handle = Arc::clone(&service).start(IntervalTicker::new(poll_interval));

    // 7. Wait for shutdown.
    shutdown_signal().await?;
    info!("Shutdown signal received, stopping after the current pass");
    handle.stop().await?;

    Ok(())
}

/// Resolve on Ctrl-C, or on SIGTERM where supported.
async fn shutdown_signal() -> Result<(), AnnouncerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
