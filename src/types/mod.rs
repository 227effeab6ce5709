// src/types/mod.rs - Core data types shared by the guard components

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Declares a platform snowflake id wrapper.
///
/// Ids serialize as decimal strings so they survive JSON consumers that
/// cannot represent 64-bit integers.
macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

snowflake_id!(
    /// A guild (server) on the chat platform
    GuildId
);
snowflake_id!(
    /// A text or voice channel
    ChannelId
);
snowflake_id!(
    /// A user account
    UserId
);
snowflake_id!(MessageId);

/// A chat message as seen by the guard
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub author_id: UserId,
    /// Full tag (`name#discriminator` or the unique username)
    pub author_tag: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A member currently connected to a voice channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMember {
    pub user_id: UserId,
    pub name: String,
    pub is_bot: bool,
}

/// A voice channel together with its current occupants
#[derive(Debug, Clone)]
pub struct VoiceChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub members: Vec<VoiceMember>,
}

impl VoiceChannelInfo {
    pub fn humans(&self) -> impl Iterator<Item = &VoiceMember> {
        self.members.iter().filter(|m| !m.is_bot)
    }

    pub fn human_count(&self) -> usize {
        self.humans().count()
    }

    pub fn human_names(&self) -> Vec<String> {
        self.humans().map(|m| m.name.clone()).collect()
    }
}

/// A voice presence transition reported by the platform
#[derive(Debug, Clone)]
pub struct VoicePresenceChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub user_tag: String,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

impl VoicePresenceChange {
    pub fn joined(&self) -> Option<ChannelId> {
        match self.new_channel {
            Some(new) if self.old_channel != Some(new) => Some(new),
            _ => None,
        }
    }

    pub fn left(&self) -> Option<ChannelId> {
        match self.old_channel {
            Some(old) if self.new_channel != Some(old) => Some(old),
            _ => None,
        }
    }
}

/// The channel a scan selected as most active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChannel {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub human_count: usize,
}

/// Result of scanning one guild. `most_active` is `None` when no voice
/// channel has a human member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub most_active: Option<ActiveChannel>,
}

/// Result of running the profanity matcher over a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub found: bool,
    pub matched_words: Vec<String>,
}

/// Per-user violation counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationRecord {
    pub user_id: UserId,
    pub count: u32,
    pub last_violation_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_disconnected: bool,
}

impl ViolationRecord {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            count: 0,
            last_violation_at: None,
            is_disconnected: false,
        }
    }

    /// Where this record sits in the escalation ladder
    pub fn state(&self, threshold: u32) -> ViolationState {
        if self.count == 0 {
            ViolationState::Clean
        } else if self.count < threshold {
            ViolationState::Warned(self.count)
        } else {
            ViolationState::Disconnected
        }
    }
}

/// Escalation states: clean, warned n times, over the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationState {
    Clean,
    Warned(u32),
    Disconnected,
}
