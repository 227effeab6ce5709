// src/bot/presence.rs - Joins, switches and leaves voice channels

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::platforms::{PlatformError, VoicePlatform};
use crate::types::{ChannelId, GuildId, ScanSnapshot, UserId};

/// Time given to a destroyed connection to settle before reconnecting
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// What a presence operation ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceAction {
    Joined(ChannelId),
    Switched { from: ChannelId, to: ChannelId },
    AlreadyConnected(ChannelId),
    Left(ChannelId),
    Stayed,
    Idle,
}

/// Decides join/switch/leave against a scan result and issues the calls.
///
/// The bot's current channel is always read from the platform at the moment
/// of action; nothing here caches it.
pub struct PresenceController {
    platform: Arc<dyn VoicePlatform>,
    settle_delay: Duration,
}

impl PresenceController {
    pub fn new(platform: Arc<dyn VoicePlatform>) -> Self {
        Self::with_settle_delay(platform, DEFAULT_SETTLE_DELAY)
    }

    pub fn with_settle_delay(platform: Arc<dyn VoicePlatform>, settle_delay: Duration) -> Self {
        Self {
            platform,
            settle_delay,
        }
    }

    /// Bring the guild's voice connection in line with a scan result
    pub async fn reconcile(&self, guild_id: GuildId, snapshot: &ScanSnapshot) -> Result<PresenceAction, PlatformError> {
        match &snapshot.most_active {
            Some(target) => {
                let current = self.platform.current_connection(guild_id).await;
                if current == Some(target.channel_id) {
                    info!("Already in the most active channel");
                    return Ok(PresenceAction::AlreadyConnected(target.channel_id));
                }
                info!("Switching to active channel: {}", target.channel_name);
                self.connect_to(guild_id, target.channel_id).await
            }
            None => {
                let Some(current) = self.platform.current_connection(guild_id).await else {
                    return Ok(PresenceAction::Idle);
                };

                let channels = self.platform.voice_channels(guild_id).await?;
                let humans = channels
                    .iter()
                    .find(|c| c.id == current)
                    .map(|c| c.human_count())
                    .unwrap_or(0);

                if humans > 0 {
                    debug!("Staying in channel {} with {} humans", current, humans);
                    return Ok(PresenceAction::Stayed);
                }

                info!("Leaving empty channel: {}", current);
                self.platform.disconnect(guild_id).await?;
                Ok(PresenceAction::Left(current))
            }
        }
    }

    /// Join a channel regardless of the auto-guard flags
    pub async fn manual_join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<PresenceAction, PlatformError> {
        self.connect_to(guild_id, channel_id).await
    }

    /// Leave the current channel. Returns the channel left, or `None` when
    /// the bot was not connected.
    pub async fn manual_leave(&self, guild_id: GuildId) -> Result<Option<ChannelId>, PlatformError> {
        let Some(current) = self.platform.current_connection(guild_id).await else {
            info!("No connection to leave");
            return Ok(None);
        };
        self.platform.disconnect(guild_id).await?;
        info!("Left voice channel {}", current);
        Ok(Some(current))
    }

    /// Disconnect a single member from whatever voice channel they occupy.
    /// Returns whether the member was found in voice.
    pub async fn force_disconnect_user(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<bool, PlatformError> {
        match self.platform.member_voice_channel(guild_id, user_id).await? {
            Some(channel_id) => {
                self.platform.disconnect_member(guild_id, user_id, reason).await?;
                info!("Disconnected user {} from voice channel {}: {}", user_id, channel_id, reason);
                Ok(true)
            }
            None => {
                warn!("User {} is not in a voice channel", user_id);
                Ok(false)
            }
        }
    }

    /// Destroy every connection the bot holds (shutdown)
    pub async fn leave_all(&self) {
        for guild_id in self.platform.guild_ids() {
            if self.platform.current_connection(guild_id).await.is_none() {
                continue;
            }
            if let Err(e) = self.platform.disconnect(guild_id).await {
                error!("Failed to leave voice in guild {}: {}", guild_id, e);
            }
        }
    }

    async fn connect_to(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<PresenceAction, PlatformError> {
        if !self.platform.can_connect(guild_id, channel_id).await? {
            error!("No permission to connect to channel {}", channel_id);
            return Err(PlatformError::MissingPermission {
                permission: "Connect",
                channel_id,
            });
        }

        let previous = self.platform.current_connection(guild_id).await;
        if previous == Some(channel_id) {
            info!("Already connected to channel {}", channel_id);
            return Ok(PresenceAction::AlreadyConnected(channel_id));
        }

        if let Some(from) = previous {
            info!("Disconnecting from current channel {}...", from);
            self.platform.disconnect(guild_id).await?;
            sleep(self.settle_delay).await;
        }

        self.platform.connect(guild_id, channel_id).await?;
        info!("Joined voice channel {} in guild {}", channel_id, guild_id);

        Ok(match previous {
            Some(from) => PresenceAction::Switched { from, to: channel_id },
            None => PresenceAction::Joined(channel_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockPlatform, PlatformCall};
    use crate::types::ActiveChannel;

    const GUILD: GuildId = GuildId(1);

    fn setup() -> (Arc<MockPlatform>, PresenceController) {
        let platform = Arc::new(MockPlatform::new());
        platform.add_channel(GUILD, ChannelId(10), "lounge");
        platform.add_channel(GUILD, ChannelId(11), "gaming");
        let controller = PresenceController::with_settle_delay(platform.clone(), Duration::from_millis(1));
        (platform, controller)
    }

    fn snapshot(channel: u64) -> ScanSnapshot {
        ScanSnapshot {
            most_active: Some(ActiveChannel {
                channel_id: ChannelId(channel),
                channel_name: format!("channel-{}", channel),
                human_count: 1,
            }),
        }
    }

    #[tokio::test]
    async fn test_reconcile_joins_when_disconnected() {
        let (platform, controller) = setup();
        let action = controller.reconcile(GUILD, &snapshot(10)).await.unwrap();
        assert_eq!(action, PresenceAction::Joined(ChannelId(10)));
        assert_eq!(platform.connection(GUILD), Some(ChannelId(10)));
    }

    #[tokio::test]
    async fn test_reconcile_switches_channels() {
        let (platform, controller) = setup();
        platform.set_connection(GUILD, ChannelId(10));

        let action = controller.reconcile(GUILD, &snapshot(11)).await.unwrap();
        assert_eq!(
            action,
            PresenceAction::Switched {
                from: ChannelId(10),
                to: ChannelId(11)
            }
        );
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::Disconnect(GUILD), PlatformCall::Connect(GUILD, ChannelId(11))]
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_noop_in_target_channel() {
        let (platform, controller) = setup();
        platform.set_connection(GUILD, ChannelId(10));

        let action = controller.reconcile(GUILD, &snapshot(10)).await.unwrap();
        assert_eq!(action, PresenceAction::AlreadyConnected(ChannelId(10)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_leaves_empty_channel() {
        let (platform, controller) = setup();
        platform.set_connection(GUILD, ChannelId(10));
        platform.place_member(GUILD, ChannelId(10), UserId(500), "music bot", true);

        let action = controller.reconcile(GUILD, &ScanSnapshot::default()).await.unwrap();
        assert_eq!(action, PresenceAction::Left(ChannelId(10)));
        assert_eq!(platform.connection(GUILD), None);
    }

    #[tokio::test]
    async fn test_reconcile_stays_when_idle_snapshot_but_humans_present() {
        // Humans in an excluded channel yield an empty snapshot
        let (platform, controller) = setup();
        platform.set_connection(GUILD, ChannelId(10));
        platform.place_member(GUILD, ChannelId(10), UserId(1), "alice", false);

        let action = controller.reconcile(GUILD, &ScanSnapshot::default()).await.unwrap();
        assert_eq!(action, PresenceAction::Stayed);
        assert_eq!(platform.connection(GUILD), Some(ChannelId(10)));
    }

    #[tokio::test]
    async fn test_missing_permission_aborts_without_leaving() {
        let (platform, controller) = setup();
        platform.set_connection(GUILD, ChannelId(10));
        platform.deny_connect(ChannelId(11));

        let result = controller.reconcile(GUILD, &snapshot(11)).await;
        assert!(matches!(result, Err(PlatformError::MissingPermission { .. })));
        assert_eq!(platform.connection(GUILD), Some(ChannelId(10)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_manual_leave_without_connection() {
        let (_platform, controller) = setup();
        assert_eq!(controller.manual_leave(GUILD).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_force_disconnect_user() {
        let (platform, controller) = setup();
        platform.place_member(GUILD, ChannelId(11), UserId(3), "carol", false);

        assert!(controller
            .force_disconnect_user(GUILD, UserId(3), "policy violation")
            .await
            .unwrap());
        assert!(!controller
            .force_disconnect_user(GUILD, UserId(3), "policy violation")
            .await
            .unwrap());
        assert_eq!(
            platform.count_calls(|c| matches!(c, PlatformCall::DisconnectMember(..))),
            1
        );
    }
}
