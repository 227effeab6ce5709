// In-memory platform used by unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::platforms::{PlatformError, VoicePlatform};
use crate::types::{ChannelId, GuildId, MessageId, UserId, VoiceChannelInfo, VoiceMember};

pub const BOT_USER: UserId = UserId(999);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Connect(GuildId, ChannelId),
    Disconnect(GuildId),
    DisconnectMember(GuildId, UserId, String),
    DeleteMessage(ChannelId, MessageId),
    SendMessage(ChannelId, String),
}

#[derive(Default)]
struct MockState {
    channels: HashMap<GuildId, Vec<VoiceChannelInfo>>,
    connections: HashMap<GuildId, ChannelId>,
    denied_channels: HashSet<ChannelId>,
    user_names: HashMap<UserId, String>,
    calls: Vec<PlatformCall>,
    fail_deletes: bool,
    fail_member_disconnects: bool,
}

#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, guild_id: GuildId, channel_id: ChannelId, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.channels.entry(guild_id).or_default().push(VoiceChannelInfo {
            id: channel_id,
            name: name.to_string(),
            members: Vec::new(),
        });
    }

    /// Put a member into a channel, removing them from any other one first
    pub fn place_member(&self, guild_id: GuildId, channel_id: ChannelId, user_id: UserId, name: &str, is_bot: bool) {
        let mut state = self.state.lock().unwrap();
        state.user_names.insert(user_id, name.to_string());
        let channels = state.channels.entry(guild_id).or_default();
        for channel in channels.iter_mut() {
            channel.members.retain(|m| m.user_id != user_id);
        }
        if let Some(channel) = channels.iter_mut().find(|c| c.id == channel_id) {
            channel.members.push(VoiceMember {
                user_id,
                name: name.to_string(),
                is_bot,
            });
        }
    }

    pub fn remove_member(&self, guild_id: GuildId, user_id: UserId) {
        let mut state = self.state.lock().unwrap();
        if let Some(channels) = state.channels.get_mut(&guild_id) {
            for channel in channels.iter_mut() {
                channel.members.retain(|m| m.user_id != user_id);
            }
        }
    }

    pub fn set_connection(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.state.lock().unwrap().connections.insert(guild_id, channel_id);
    }

    pub fn deny_connect(&self, channel_id: ChannelId) {
        self.state.lock().unwrap().denied_channels.insert(channel_id);
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_deletes = true;
    }

    pub fn fail_member_disconnects(&self) {
        self.state.lock().unwrap().fail_member_disconnects = true;
    }

    pub fn connection(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.state.lock().unwrap().connections.get(&guild_id).copied()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage(_, content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, matches: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }
}

#[async_trait]
impl VoicePlatform for MockPlatform {
    fn platform_name(&self) -> &str {
        "mock"
    }

    fn current_user_id(&self) -> Option<UserId> {
        Some(BOT_USER)
    }

    fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.state.lock().unwrap().channels.keys().copied().collect();
        ids.sort();
        ids
    }

    async fn voice_channels(&self, guild_id: GuildId) -> Result<Vec<VoiceChannelInfo>, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(&guild_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("guild {}", guild_id)))
    }

    async fn current_connection(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.connection(guild_id)
    }

    async fn can_connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<bool, PlatformError> {
        Ok(!self.state.lock().unwrap().denied_channels.contains(&channel_id))
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PlatformCall::Connect(guild_id, channel_id));
        state.connections.insert(guild_id, channel_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PlatformCall::Disconnect(guild_id));
        state.connections.remove(&guild_id);
        Ok(())
    }

    async fn member_voice_channel(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<ChannelId>, PlatformError> {
        let state = self.state.lock().unwrap();
        Ok(state.channels.get(&guild_id).and_then(|channels| {
            channels
                .iter()
                .find(|c| c.members.iter().any(|m| m.user_id == user_id))
                .map(|c| c.id)
        }))
    }

    async fn disconnect_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(PlatformCall::DisconnectMember(guild_id, user_id, reason.to_string()));
        if state.fail_member_disconnects {
            return Err(PlatformError::Request("missing move members permission".to_string()));
        }
        if let Some(channels) = state.channels.get_mut(&guild_id) {
            for channel in channels.iter_mut() {
                channel.members.retain(|m| m.user_id != user_id);
            }
        }
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(PlatformCall::DeleteMessage(channel_id, message_id));
        if state.fail_deletes {
            return Err(PlatformError::Request("unknown message".to_string()));
        }
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(PlatformCall::SendMessage(channel_id, content.to_string()));
        Ok(())
    }

    async fn user_name(&self, user_id: UserId) -> Option<String> {
        self.state.lock().unwrap().user_names.get(&user_id).cloned()
    }
}
