// src/bot/commands.rs - Slash-command surface mapped onto manual overrides

use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::bot::auto_guard::AutoGuard;
use crate::bot::presence::{PresenceAction, PresenceController};
use crate::bot::violations::ViolationStore;
use crate::config::{FilterStore, GuardConfig};
use crate::platforms::{PlatformError, VoicePlatform};
use crate::types::{ChannelId, GuildId, UserId, VoiceChannelInfo};

/// Reply used when a command fails unexpectedly
pub const COMMAND_FAILED: &str = "❌ Command failed - check console for details";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardCommand {
    Join,
    Leave,
    Status,
    Follow,
    Guard,
    Scan,
    Filter,
    Violations,
    ForceScan,
}

impl GuardCommand {
    pub fn all() -> &'static [GuardCommand] {
        &[
            GuardCommand::Join,
            GuardCommand::Leave,
            GuardCommand::Status,
            GuardCommand::Follow,
            GuardCommand::Guard,
            GuardCommand::Scan,
            GuardCommand::Filter,
            GuardCommand::Violations,
            GuardCommand::ForceScan,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            GuardCommand::Join => "join",
            GuardCommand::Leave => "leave",
            GuardCommand::Status => "status",
            GuardCommand::Follow => "follow",
            GuardCommand::Guard => "guard",
            GuardCommand::Scan => "scan",
            GuardCommand::Filter => "filter",
            GuardCommand::Violations => "violations",
            GuardCommand::ForceScan => "force-scan",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            GuardCommand::Join => "Join the primary guarded voice channel",
            GuardCommand::Leave => "Leave the current voice channel",
            GuardCommand::Status => "Show voice connection and scanning status",
            GuardCommand::Follow => "Join your current voice channel",
            GuardCommand::Guard => "Toggle auto-guard mode on/off",
            GuardCommand::Scan => "Toggle dynamic channel scanning on/off",
            GuardCommand::Filter => "Toggle the profanity filter on/off",
            GuardCommand::Violations => "Show user violation status",
            GuardCommand::ForceScan => "Force an immediate scan of all voice channels",
        }
    }

    /// Interim reply shown while a slow command runs
    pub fn progress_message(&self) -> Option<&'static str> {
        match self {
            GuardCommand::ForceScan => Some("🔍 **Forcing immediate channel scan...**"),
            _ => None,
        }
    }
}

/// A resolved command invocation from a guild member
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub command: GuardCommand,
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub user_tag: String,
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ENABLED"
    } else {
        "DISABLED"
    }
}

/// Seconds without a trailing `.0` for whole values
fn format_seconds(interval: Duration) -> String {
    let millis = interval.as_millis();
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{}", millis as f64 / 1000.0)
    }
}

pub struct CommandDispatcher {
    platform: Arc<dyn VoicePlatform>,
    config: Arc<RwLock<GuardConfig>>,
    filter: Arc<FilterStore>,
    violations: Arc<ViolationStore>,
    presence: Arc<PresenceController>,
    auto_guard: Arc<AutoGuard>,
}

impl CommandDispatcher {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        config: Arc<RwLock<GuardConfig>>,
        filter: Arc<FilterStore>,
        violations: Arc<ViolationStore>,
        presence: Arc<PresenceController>,
        auto_guard: Arc<AutoGuard>,
    ) -> Self {
        Self {
            platform,
            config,
            filter,
            violations,
            presence,
            auto_guard,
        }
    }

    /// Run a command and produce the reply text. Failures are logged and
    /// collapsed into a generic failure reply.
    pub async fn respond(&self, invocation: &CommandInvocation) -> String {
        match self.execute(invocation).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Command '{}' failed: {}", invocation.command.name(), e);
                COMMAND_FAILED.to_string()
            }
        }
    }

    pub async fn execute(&self, invocation: &CommandInvocation) -> Result<String, PlatformError> {
        let guild_id = invocation.guild_id;

        match invocation.command {
            GuardCommand::Join => {
                info!("Manual join command from {}", invocation.user_tag);
                let primary = self.config.read().await.primary_channel_id;
                Ok(self.manual_join(guild_id, primary).await)
            }
            GuardCommand::Leave => {
                info!("Manual leave command from {}", invocation.user_tag);
                Ok(self.manual_leave(guild_id).await)
            }
            GuardCommand::Status => self.status(guild_id).await,
            GuardCommand::Follow => self.follow(invocation).await,
            GuardCommand::Guard => Ok(self.toggle_guard().await),
            GuardCommand::Scan => Ok(self.toggle_scan().await),
            GuardCommand::Filter => Ok(self.toggle_filter().await),
            GuardCommand::Violations => Ok(self.violations_report().await),
            GuardCommand::ForceScan => {
                info!("Force scan command from {}", invocation.user_tag);
                self.force_scan(guild_id).await
            }
        }
    }

    async fn find_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Option<VoiceChannelInfo>, PlatformError> {
        Ok(self
            .platform
            .voice_channels(guild_id)
            .await?
            .into_iter()
            .find(|c| c.id == channel_id))
    }

    async fn manual_join(&self, guild_id: GuildId, channel_id: Option<ChannelId>) -> String {
        let channel = match channel_id {
            Some(id) => self.find_channel(guild_id, id).await,
            None => Ok(None),
        };

        let channel = match channel {
            Ok(Some(channel)) => channel,
            Ok(None) => return "❌ Voice channel not found!".to_string(),
            Err(e) => {
                error!("Manual join lookup failed: {}", e);
                return "❌ Failed to join voice channel!".to_string();
            }
        };

        match self.presence.manual_join(guild_id, channel.id).await {
            Ok(_) => format!("🎵 Manually joined **{}**!", channel.name),
            Err(PlatformError::MissingPermission { .. }) => {
                format!("❌ Missing permission to join **{}**!", channel.name)
            }
            Err(e) => {
                error!("Manual join error: {}", e);
                "❌ Failed to join voice channel!".to_string()
            }
        }
    }

    async fn manual_leave(&self, guild_id: GuildId) -> String {
        match self.presence.manual_leave(guild_id).await {
            Ok(Some(_)) => "🚪 Manually left the voice channel!".to_string(),
            Ok(None) => "❌ Not connected to any voice channel!".to_string(),
            Err(e) => {
                error!("Manual leave error: {}", e);
                "❌ Failed to leave voice channel!".to_string()
            }
        }
    }

    async fn status(&self, guild_id: GuildId) -> Result<String, PlatformError> {
        let config = self.config.read().await.clone();
        let filter_enabled = self.filter.is_enabled().await;
        let connection = self.platform.current_connection(guild_id).await;

        let mut reply = String::from("🤖 **Voice Guard Status**\n\n");
        reply.push_str(&format!("🛡️ Auto-guard: **{}**\n", on_off(config.auto_guard_enabled)));
        reply.push_str(&format!(
            "🔍 Dynamic scanning: **{}**\n",
            on_off(config.dynamic_scan_enabled)
        ));
        reply.push_str(&format!("🔍 Profanity filter: **{}**\n", on_off(filter_enabled)));
        reply.push_str(&format!(
            "🔗 Voice connection: **{}**\n",
            if connection.is_some() { "CONNECTED" } else { "DISCONNECTED" }
        ));

        let current = match connection {
            Some(id) => self.find_channel(guild_id, id).await?,
            None => None,
        };

        match current {
            Some(channel) => {
                let humans = channel.human_names();
                reply.push_str(&format!("🎯 Current channel: **{}**\n", channel.name));
                reply.push_str(&format!("👥 Humans in current channel: **{}**\n", humans.len()));
                if !humans.is_empty() {
                    reply.push_str("\n👤 Current members:\n");
                    for name in humans {
                        reply.push_str(&format!("   - {}\n", name));
                    }
                }
            }
            None => reply.push_str("🎯 Current channel: **None**\n"),
        }

        reply.push_str(&format!(
            "\n⏱️ Scan interval: **{} seconds**",
            format_seconds(config.scan_interval)
        ));
        Ok(reply)
    }

    async fn follow(&self, invocation: &CommandInvocation) -> Result<String, PlatformError> {
        let guild_id = invocation.guild_id;
        let Some(channel_id) = self
            .platform
            .member_voice_channel(guild_id, invocation.user_id)
            .await?
        else {
            return Ok("❌ You need to be in a voice channel for me to follow you!".to_string());
        };

        let name = self
            .find_channel(guild_id, channel_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| channel_id.to_string());
        info!("Follow command: {} -> {}", invocation.user_tag, name);

        let result = self.manual_join(guild_id, Some(channel_id)).await;
        Ok(format!("🏃 Following you to **{}**!\n{}", name, result))
    }

    async fn toggle_guard(&self) -> String {
        let enabled = {
            let mut config = self.config.write().await;
            config.auto_guard_enabled = !config.auto_guard_enabled;
            config.auto_guard_enabled
        };
        info!("Auto-guard toggled: {}", if enabled { "ON" } else { "OFF" });
        self.auto_guard.sync_timer().await;

        let mut reply = format!("🛡️ Auto-guard mode is now **{}**\n\n", on_off(enabled));
        if enabled {
            reply.push_str("✅ Dynamically scanning all voice channels\n");
            reply.push_str("✅ Automatically joining channels with members\n");
            reply.push_str("✅ Switching to the most active channel\n");
            reply.push_str("✅ Leaving when all channels are empty");
        } else {
            reply.push_str("❌ Will NOT automatically join/leave\n");
            reply.push_str("❌ Dynamic scanning is stopped\n");
            reply.push_str("💡 Use manual commands to control the bot");
        }
        reply
    }

    async fn toggle_scan(&self) -> String {
        let (enabled, interval) = {
            let mut config = self.config.write().await;
            config.dynamic_scan_enabled = !config.dynamic_scan_enabled;
            (config.dynamic_scan_enabled, config.scan_interval)
        };
        info!("Dynamic scanning toggled: {}", if enabled { "ON" } else { "OFF" });
        self.auto_guard.sync_timer().await;

        let mut reply = format!("🔍 Dynamic channel scanning is now **{}**\n\n", on_off(enabled));
        if enabled {
            reply.push_str(&format!(
                "✅ Scanning all voice channels every {} seconds\n",
                format_seconds(interval)
            ));
            reply.push_str("✅ Automatically joining channels with members\n");
            reply.push_str("✅ Switching to most active channels\n");
            reply.push_str("✅ Responding to voice state changes instantly");
        } else {
            reply.push_str("❌ Not scanning channels automatically\n");
            reply.push_str("💡 Staying in the current channel");
        }
        reply
    }

    async fn toggle_filter(&self) -> String {
        let (enabled, persisted) = self.filter.toggle_enabled().await;
        if let Err(e) = persisted {
            error!("Failed to save profanity filter settings: {}", e);
        }

        let mut reply = format!("🔍 Profanity filter is now **{}**\n\n", on_off(enabled));
        if enabled {
            let settings = self.filter.settings().await;
            reply.push_str("✅ Monitoring messages from users in ANY voice channel\n");
            reply.push_str("✅ Bad words will be deleted and users warned\n");
            reply.push_str(&format!(
                "✅ Users will be disconnected after {} violations\n",
                settings.warning_threshold
            ));
            reply.push_str(&format!("📊 Loaded {} bad words", self.filter.word_count().await));
        } else {
            reply.push_str("❌ Not monitoring messages for profanity\n");
            reply.push_str("💡 Users can say anything without consequences");
        }
        reply
    }

    async fn violations_report(&self) -> String {
        let records = self.violations.list_all().await;
        let threshold = self.filter.settings().await.warning_threshold;

        let mut reply = String::from("📊 **User Violation Status**\n\n");
        if records.is_empty() {
            reply.push_str("✅ No violations recorded yet!");
            return reply;
        }

        reply.push_str("⚠️ Users with violations:\n\n");
        for (user_id, record) in records {
            match self.platform.user_name(user_id).await {
                Some(name) => {
                    let last = record
                        .last_violation_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                        .unwrap_or_else(|| "Never".to_string());
                    reply.push_str(&format!("👤 **{}**\n", name));
                    reply.push_str(&format!("   - Violations: {}/{}\n", record.count, threshold));
                    reply.push_str(&format!("   - Last violation: {}\n", last));
                    reply.push_str(&format!(
                        "   - Status: {}\n\n",
                        if record.is_disconnected { "🚫 Disconnected" } else { "✅ Active" }
                    ));
                }
                None => {
                    reply.push_str(&format!("👤 **Unknown User ({})**\n", user_id));
                    reply.push_str(&format!("   - Violations: {}/{}\n\n", record.count, threshold));
                }
            }
        }
        reply
    }

    async fn force_scan(&self, guild_id: GuildId) -> Result<String, PlatformError> {
        let reports = self.auto_guard.cycle().run().await;
        if let Some(report) = reports.get(&guild_id) {
            if let Some(PresenceAction::Left(channel)) = &report.action {
                info!("Force scan left channel {}", channel);
            }
        }

        let current = match self.platform.current_connection(guild_id).await {
            Some(id) => self.find_channel(guild_id, id).await?,
            None => None,
        };

        let mut reply = String::from("✅ **Scan completed!**\n\n");
        match current {
            Some(channel) => {
                reply.push_str(&format!("🎯 Now in: **{}**\n", channel.name));
                reply.push_str(&format!("👥 Humans in channel: **{}**", channel.human_count()));
            }
            None => {
                reply.push_str("🎯 Not in any voice channel\n");
                reply.push_str("❌ No active channels found");
            }
        }
        Ok(reply)
    }
}
