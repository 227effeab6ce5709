use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChannelId, GuildId, MessageId, UserId, VoiceChannelInfo};

pub mod discord;

#[cfg(test)]
pub mod mock;

/// Failures reported by the chat/voice platform. All of them are non-fatal
/// to the guard: callers log them and carry on.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform client is not ready yet")]
    NotReady,

    #[error("{0} not found")]
    NotFound(String),

    #[error("missing {permission} permission in channel {channel_id}")]
    MissingPermission {
        permission: &'static str,
        channel_id: ChannelId,
    },

    #[error("voice connection failed: {0}")]
    Voice(String),

    #[error("platform request failed: {0}")]
    Request(String),
}

/// Trait defining everything the guard needs from the chat platform.
///
/// Reads are always fresh: implementations must not hand out state cached
/// across calls, since concurrent scans rely on seeing the latest
/// connection.
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    /// Get the platform identifier (e.g., "discord")
    fn platform_name(&self) -> &str;

    /// The bot's own account, once known
    fn current_user_id(&self) -> Option<UserId>;

    /// Guilds the bot is currently a member of
    fn guild_ids(&self) -> Vec<GuildId>;

    /// Voice channels of a guild with their occupants, in display order
    async fn voice_channels(&self, guild_id: GuildId) -> Result<Vec<VoiceChannelInfo>, PlatformError>;

    /// Channel the bot's voice connection currently targets
    async fn current_connection(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Whether the bot holds the connect permission on `channel_id`
    async fn can_connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool, PlatformError>;

    /// Open a presence-only voice connection (no audio in or out)
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlatformError>;

    /// Destroy the bot's voice connection in a guild
    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlatformError>;

    /// Voice channel a member currently occupies
    async fn member_voice_channel(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<ChannelId>, PlatformError>;

    /// Kick a member out of voice, recording `reason` in the audit log
    async fn disconnect_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PlatformError>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), PlatformError>;

    /// Display name for a user, if it can be resolved
    async fn user_name(&self, user_id: UserId) -> Option<String>;
}
