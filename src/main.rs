use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use voiceguard::bot::violation_log::ViolationLog;
use voiceguard::prelude::*;

/// Time each component gets to stop before it is abandoned
const COMPONENT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting Voice Guard v{}", voiceguard::VERSION);
    info!("Features: Dynamic Channel Scanning + Profanity Filter");

    // =================================================================
    // CONFIGURATION
    // =================================================================

    let config = AppConfig::from_env().context("Failed to load configuration from environment")?;
    let filter = FilterStore::load_or_create(&config.filter_path)
        .await
        .with_context(|| format!("Failed to load profanity filter from {}", config.filter_path.display()))?;
    let filter = Arc::new(filter);
    let violation_log = ViolationLog::new(&config.violation_log_path);

    // =================================================================
    // BOT CORE AND DISCORD CLIENT
    // =================================================================

    let platform = Arc::new(DiscordPlatform::new(songbird::Songbird::serenity()));
    let bot = Arc::new(GuardBot::new(
        platform.clone(),
        config.guard.clone(),
        filter,
        Some(violation_log),
    ));

    let handler = DiscordHandler::new(bot.clone(), config.discord.command_guild_id);
    let mut client = build_client(&config.discord, handler, &platform)
        .await
        .context("Failed to create Discord client")?;

    // =================================================================
    // GRACEFUL SHUTDOWN SETUP
    // =================================================================

    let shutdown_manager = Arc::new(GracefulShutdown::new(COMPONENT_SHUTDOWN_TIMEOUT));
    shutdown_manager
        .register_component(Box::new(GuardShutdown(bot.clone())))
        .await;
    shutdown_manager
        .register_component(Box::new(GatewayShutdown(client.shard_manager.clone())))
        .await;
    shutdown_manager.start_signal_handlers();

    // =================================================================
    // WEB SERVER
    // =================================================================

    start_web_dashboard(bot.clone(), config.web_port);

    // =================================================================
    // GATEWAY
    // =================================================================

    let gateway_shutdown = shutdown_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = client.start().await {
            error!("Discord client stopped: {}", e);
            gateway_shutdown.trigger_shutdown().await;
        }
    });

    let stats = shutdown_manager.wait_for_shutdown().await;
    info!("Components shut down: {:?}", stats.components_shutdown);
    if !stats.failed_components.is_empty() {
        warn!("Some components failed to shutdown cleanly: {:?}", stats.failed_components);
    }

    info!("Voice Guard shutdown complete. Goodbye!");
    Ok(())
}

#[cfg(feature = "web")]
fn start_web_dashboard(bot: Arc<GuardBot>, port: u16) {
    tokio::spawn(async move {
        let dashboard = WebDashboard::new(bot);
        if let Err(e) = dashboard.start_server(port).await {
            error!("Web server error: {}", e);
        }
    });
}

#[cfg(not(feature = "web"))]
fn start_web_dashboard(_bot: Arc<GuardBot>, _port: u16) {
    warn!("Web server is disabled. Enable with --features web");
}
