// src/bot/scanner.rs - Finds the most populated voice channel per guild

use log::{error, info};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::GuardConfig;
use crate::platforms::VoicePlatform;
use crate::types::{ActiveChannel, ChannelId, GuildId, ScanSnapshot, VoiceChannelInfo};

/// Pick the channel with the strictly greatest number of human members.
/// Ties keep the first channel in enumeration order; channels without
/// humans never win.
pub fn select_most_active(channels: &[VoiceChannelInfo], excluded: &HashSet<ChannelId>) -> ScanSnapshot {
    let mut best: Option<ActiveChannel> = None;

    for channel in channels.iter().filter(|c| !excluded.contains(&c.id)) {
        let humans = channel.human_count();
        let best_count = best.as_ref().map(|b| b.human_count).unwrap_or(0);
        if humans > best_count {
            best = Some(ActiveChannel {
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                human_count: humans,
            });
        }
    }

    ScanSnapshot { most_active: best }
}

pub struct ChannelActivityScanner {
    platform: Arc<dyn VoicePlatform>,
    config: Arc<RwLock<GuardConfig>>,
}

impl ChannelActivityScanner {
    pub fn new(platform: Arc<dyn VoicePlatform>, config: Arc<RwLock<GuardConfig>>) -> Self {
        Self { platform, config }
    }

    /// Scan every guild. Returns an empty map while scanning is gated off
    /// by either the auto-guard or the dynamic scan flag.
    pub async fn scan(&self) -> BTreeMap<GuildId, ScanSnapshot> {
        let mut results = BTreeMap::new();

        let excluded = {
            let config = self.config.read().await;
            if !config.scanning_active() {
                return results;
            }
            config.excluded_channel_ids.clone()
        };

        info!("=== DYNAMIC CHANNEL SCAN ===");

        for guild_id in self.platform.guild_ids() {
            let channels = match self.platform.voice_channels(guild_id).await {
                Ok(channels) => channels,
                Err(e) => {
                    error!("Failed to list voice channels for guild {}: {}", guild_id, e);
                    continue;
                }
            };

            info!("Scanning guild {}:", guild_id);
            for channel in channels.iter().filter(|c| !excluded.contains(&c.id)) {
                let humans = channel.human_names();
                info!(
                    "   {} - {} humans, {} total",
                    channel.name,
                    humans.len(),
                    channel.members.len()
                );
                if !humans.is_empty() {
                    info!("      Members: {}", humans.join(", "));
                }
            }

            let snapshot = select_most_active(&channels, &excluded);
            match &snapshot.most_active {
                Some(active) => info!(
                    "Most active channel: {} ({} humans)",
                    active.channel_name, active.human_count
                ),
                None => info!("No active channels found"),
            }
            results.insert(guild_id, snapshot);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use crate::types::{UserId, VoiceMember};

    fn channel(id: u64, humans: usize, bots: usize) -> VoiceChannelInfo {
        let mut members = Vec::new();
        for i in 0..humans {
            members.push(VoiceMember {
                user_id: UserId(id * 100 + i as u64),
                name: format!("human-{}", i),
                is_bot: false,
            });
        }
        for i in 0..bots {
            members.push(VoiceMember {
                user_id: UserId(id * 100 + 50 + i as u64),
                name: format!("bot-{}", i),
                is_bot: true,
            });
        }
        VoiceChannelInfo {
            id: ChannelId(id),
            name: format!("channel-{}", id),
            members,
        }
    }

    #[test]
    fn test_selects_channel_with_most_humans() {
        let channels = vec![channel(1, 3, 0), channel(2, 1, 0), channel(3, 0, 0)];
        let snapshot = select_most_active(&channels, &HashSet::new());
        let active = snapshot.most_active.unwrap();
        assert_eq!(active.channel_id, ChannelId(1));
        assert_eq!(active.human_count, 3);
    }

    #[test]
    fn test_bots_do_not_count() {
        let channels = vec![channel(1, 1, 5), channel(2, 2, 0)];
        let snapshot = select_most_active(&channels, &HashSet::new());
        assert_eq!(snapshot.most_active.unwrap().channel_id, ChannelId(2));
    }

    #[test]
    fn test_ties_keep_first_channel() {
        let channels = vec![channel(1, 0, 0), channel(2, 2, 0), channel(3, 2, 0)];
        let snapshot = select_most_active(&channels, &HashSet::new());
        assert_eq!(snapshot.most_active.unwrap().channel_id, ChannelId(2));
    }

    #[test]
    fn test_empty_channels_yield_none() {
        let channels = vec![channel(1, 0, 2), channel(2, 0, 0)];
        assert_eq!(select_most_active(&channels, &HashSet::new()), ScanSnapshot::default());
    }

    #[test]
    fn test_excluded_channels_are_skipped() {
        let channels = vec![channel(1, 4, 0), channel(2, 1, 0)];
        let excluded: HashSet<ChannelId> = [ChannelId(1)].into_iter().collect();
        let snapshot = select_most_active(&channels, &excluded);
        assert_eq!(snapshot.most_active.unwrap().channel_id, ChannelId(2));
    }

    #[tokio::test]
    async fn test_scan_is_gated_by_both_flags() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_channel(GuildId(1), ChannelId(10), "lounge");
        platform.place_member(GuildId(1), ChannelId(10), UserId(1), "alice", false);

        let config = Arc::new(RwLock::new(GuardConfig::default()));
        let scanner = ChannelActivityScanner::new(platform.clone(), config.clone());

        let results = scanner.scan().await;
        assert_eq!(
            results[&GuildId(1)].most_active.as_ref().map(|a| a.channel_id),
            Some(ChannelId(10))
        );

        config.write().await.dynamic_scan_enabled = false;
        assert!(scanner.scan().await.is_empty());

        {
            let mut config = config.write().await;
            config.dynamic_scan_enabled = true;
            config.auto_guard_enabled = false;
        }
        assert!(scanner.scan().await.is_empty());
    }
}
