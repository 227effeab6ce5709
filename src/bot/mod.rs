use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::{FilterStore, GuardConfig};
use crate::platforms::VoicePlatform;
use crate::types::{ChatMessage, VoicePresenceChange};

pub mod auto_guard;
pub mod commands;
pub mod escalation;
pub mod presence;
pub mod profanity;
pub mod scanner;
pub mod shutdown;
pub mod violation_log;
pub mod violations;

use auto_guard::{AutoGuard, ScanCycle, PRESENCE_DEBOUNCE, STARTUP_SCAN_DELAY};
use commands::{CommandDispatcher, CommandInvocation};
use escalation::{EscalationOutcome, EscalationPolicy};
use presence::PresenceController;
use scanner::ChannelActivityScanner;
use shutdown::ShutdownComponent;
use violation_log::ViolationLog;
use violations::ViolationStore;

/// Point-in-time view of the guard used by the status endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStatus {
    pub bot_user_id: Option<String>,
    pub platform: String,
    pub connected_guilds: usize,
    pub auto_guard: bool,
    pub dynamic_scan: bool,
    pub profanity_filter: bool,
    pub scan_interval_ms: u64,
    pub uptime_seconds: u64,
}

/// Owns every piece of guard state and routes platform events to it
pub struct GuardBot {
    platform: Arc<dyn VoicePlatform>,
    config: Arc<RwLock<GuardConfig>>,
    filter: Arc<FilterStore>,
    violations: Arc<ViolationStore>,
    presence: Arc<PresenceController>,
    auto_guard: Arc<AutoGuard>,
    escalation: EscalationPolicy,
    commands: CommandDispatcher,
    presence_debounce: Duration,
    startup_delay: Duration,
    started_at: std::time::Instant,
}

impl GuardBot {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        config: GuardConfig,
        filter: Arc<FilterStore>,
        violation_log: Option<ViolationLog>,
    ) -> Self {
        let presence = Arc::new(PresenceController::new(Arc::clone(&platform)));
        Self::with_presence(platform, config, filter, violation_log, presence)
    }

    /// Build with a custom presence controller (settle delay)
    pub fn with_presence(
        platform: Arc<dyn VoicePlatform>,
        config: GuardConfig,
        filter: Arc<FilterStore>,
        violation_log: Option<ViolationLog>,
        presence: Arc<PresenceController>,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let violations = Arc::new(ViolationStore::new());

        let scanner = ChannelActivityScanner::new(Arc::clone(&platform), Arc::clone(&config));
        let cycle = Arc::new(ScanCycle::new(scanner, Arc::clone(&presence)));
        let auto_guard = Arc::new(AutoGuard::new(cycle, Arc::clone(&config)));

        let escalation = EscalationPolicy::new(
            Arc::clone(&platform),
            Arc::clone(&presence),
            Arc::clone(&violations),
            Arc::clone(&filter),
            violation_log,
        );
        let commands = CommandDispatcher::new(
            Arc::clone(&platform),
            Arc::clone(&config),
            Arc::clone(&filter),
            Arc::clone(&violations),
            Arc::clone(&presence),
            Arc::clone(&auto_guard),
        );

        Self {
            platform,
            config,
            filter,
            violations,
            presence,
            auto_guard,
            escalation,
            commands,
            presence_debounce: PRESENCE_DEBOUNCE,
            startup_delay: STARTUP_SCAN_DELAY,
            started_at: std::time::Instant::now(),
        }
    }

    /// Override the presence debounce and startup scan delays
    pub fn with_scan_delays(mut self, presence_debounce: Duration, startup_delay: Duration) -> Self {
        self.presence_debounce = presence_debounce;
        self.startup_delay = startup_delay;
        self
    }

    pub fn config(&self) -> &Arc<RwLock<GuardConfig>> {
        &self.config
    }

    pub fn violations(&self) -> &Arc<ViolationStore> {
        &self.violations
    }

    pub fn auto_guard(&self) -> &Arc<AutoGuard> {
        &self.auto_guard
    }

    /// Called once the platform session is ready
    pub async fn on_ready(&self) {
        let config = self.config.read().await.clone();
        info!(
            "Ready on {} as {}",
            self.platform.platform_name(),
            self.platform
                .current_user_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        match config.primary_channel_id {
            Some(channel) => info!("Primary guard channel ID: {}", channel),
            None => info!("No primary guard channel configured"),
        }
        info!("Auto-guard mode: {}", if config.auto_guard_enabled { "ENABLED" } else { "DISABLED" });
        info!("Dynamic scanning: {}", if config.dynamic_scan_enabled { "ENABLED" } else { "DISABLED" });
        info!(
            "Profanity filter: {}",
            if self.filter.is_enabled().await { "ENABLED" } else { "DISABLED" }
        );

        if self.auto_guard.sync_timer().await {
            self.auto_guard.schedule_scan(self.startup_delay).await;
        }
    }

    pub async fn on_message(&self, message: &ChatMessage) -> Option<EscalationOutcome> {
        self.escalation.handle_message(message).await
    }

    /// React to a member joining, leaving or moving between voice channels.
    /// Returns whether a rescan was scheduled.
    pub async fn on_voice_state_update(&self, change: &VoicePresenceChange) -> bool {
        if Some(change.user_id) == self.platform.current_user_id() {
            return false;
        }

        let joined = change.joined();
        let left = change.left();
        if joined.is_none() && left.is_none() {
            return false;
        }

        let config = self.config.read().await.clone();
        if !config.auto_guard_enabled {
            return false;
        }

        if let Some(channel) = joined {
            info!("{} joined voice channel {}", change.user_tag, channel);
        }
        if let Some(channel) = left {
            info!("{} left voice channel {}", change.user_tag, channel);
        }

        if !config.dynamic_scan_enabled {
            return false;
        }

        debug!("Triggering scan due to voice activity");
        self.auto_guard.schedule_scan(self.presence_debounce).await;
        true
    }

    pub async fn on_command(&self, invocation: &CommandInvocation) -> String {
        self.commands.respond(invocation).await
    }

    pub async fn status(&self) -> GuardStatus {
        let config = self.config.read().await.clone();
        GuardStatus {
            bot_user_id: self.platform.current_user_id().map(|id| id.to_string()),
            platform: self.platform.platform_name().to_string(),
            connected_guilds: self.platform.guild_ids().len(),
            auto_guard: config.auto_guard_enabled,
            dynamic_scan: config.dynamic_scan_enabled,
            profanity_filter: self.filter.is_enabled().await,
            scan_interval_ms: config.scan_interval.as_millis() as u64,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Stop timers, drop pending resets and release every voice connection
    pub async fn shutdown(&self) {
        info!("Shutting down voice guard...");
        self.auto_guard.shutdown().await;
        self.violations.cancel_all_resets().await;
        self.presence.leave_all().await;
        info!("Voice guard shutdown complete");
    }
}

/// Registers the guard's own teardown with the shutdown manager
pub struct GuardShutdown(pub Arc<GuardBot>);

#[async_trait::async_trait]
impl ShutdownComponent for GuardShutdown {
    fn name(&self) -> &str {
        "voice_guard"
    }

    async fn shutdown(&self) -> Result<()> {
        self.0.shutdown().await;
        Ok(())
    }
}
