//! # Voice Guard
//!
//! A Discord bot that keeps itself in the busiest voice channel of every
//! server it is in and enforces a profanity policy on members who are in
//! voice.
//!
//! ## Features
//!
//! - **Dynamic Channel Scanning**: periodic and event-driven scans pick the
//!   voice channel with the most human members
//! - **Auto-Guard**: joins, switches and leaves channels on its own
//! - **Profanity Filter**: deletes offending messages, warns, and removes
//!   repeat offenders from voice for a while
//! - **Slash Commands**: manual join/leave/follow and runtime toggles
//! - **Health Endpoint**: JSON health and stats pages for uptime checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voiceguard::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let filter = Arc::new(FilterStore::load_or_create(&config.filter_path).await?);
//!
//!     let platform = Arc::new(DiscordPlatform::new(songbird::Songbird::serenity()));
//!     let bot = Arc::new(GuardBot::new(platform.clone(), config.guard.clone(), filter, None));
//!
//!     let handler = DiscordHandler::new(bot.clone(), config.discord.command_guild_id);
//!     let mut client = build_client(&config.discord, handler, &platform).await?;
//!     client.start().await?;
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod config;
pub mod platforms;
pub mod bot;

#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::commands::{CommandInvocation, GuardCommand};
    pub use crate::bot::shutdown::{GracefulShutdown, ShutdownComponent};
    pub use crate::bot::{GuardBot, GuardShutdown, GuardStatus};
    pub use crate::config::{AppConfig, FilterStore, GuardConfig, ProfanitySettings};
    pub use crate::platforms::{
        discord::{build_client, DiscordHandler, DiscordPlatform, GatewayShutdown},
        PlatformError, VoicePlatform,
    };
    pub use crate::types::{ChannelId, ChatMessage, GuildId, UserId, VoicePresenceChange};
    #[cfg(feature = "web")]
    pub use crate::web::{DashboardState, WebDashboard};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
