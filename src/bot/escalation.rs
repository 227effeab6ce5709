// src/bot/escalation.rs - Profanity match -> warning -> voice disconnect

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::bot::presence::PresenceController;
use crate::bot::profanity::find_profanity;
use crate::bot::violation_log::{ViolationLog, ViolationLogEntry};
use crate::bot::violations::ViolationStore;
use crate::config::{FilterStore, ProfanitySettings};
use crate::platforms::VoicePlatform;
use crate::types::{ChatMessage, ViolationRecord, ViolationState};

/// Audit-log reason attached to policy disconnects
pub const DISCONNECT_REASON: &str = "policy violation";

/// What the policy did about a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationAction {
    /// Under the threshold: message removed and user warned
    Warned,
    /// Threshold reached and the user was removed from voice
    Disconnected,
    /// Threshold reached but the disconnect failed or found no voice session
    DisconnectFailed,
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub action: EscalationAction,
    pub record: ViolationRecord,
    pub matched_words: Vec<String>,
}

/// Runs the matcher on messages from users in voice and escalates repeat
/// offenders to a temporary voice disconnect.
pub struct EscalationPolicy {
    platform: Arc<dyn VoicePlatform>,
    presence: Arc<PresenceController>,
    store: Arc<ViolationStore>,
    filter: Arc<FilterStore>,
    log: Option<ViolationLog>,
}

impl EscalationPolicy {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        presence: Arc<PresenceController>,
        store: Arc<ViolationStore>,
        filter: Arc<FilterStore>,
        log: Option<ViolationLog>,
    ) -> Self {
        Self {
            platform,
            presence,
            store,
            filter,
            log,
        }
    }

    /// Evaluate one chat message. Returns `None` when the message is out of
    /// scope (bot author, filter off, author not in voice) or clean.
    pub async fn handle_message(&self, message: &ChatMessage) -> Option<EscalationOutcome> {
        if message.author_is_bot {
            return None;
        }

        let settings = self.filter.settings().await;
        if !settings.enabled {
            return None;
        }

        // Text-only chatter is not policed
        match self
            .platform
            .member_voice_channel(message.guild_id, message.author_id)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not resolve voice state for {}: {}", message.author_tag, e);
                return None;
            }
        }

        let words = self.filter.words().await;
        let result = find_profanity(&message.content, &words, settings.case_sensitive);
        if !result.found {
            return None;
        }

        Some(self.escalate(message, result.matched_words, &settings).await)
    }

    async fn escalate(
        &self,
        message: &ChatMessage,
        matched_words: Vec<String>,
        settings: &ProfanitySettings,
    ) -> EscalationOutcome {
        let threshold = settings.warning_threshold;

        if let Err(e) = self
            .platform
            .delete_message(message.channel_id, message.message_id)
            .await
        {
            error!("Could not delete message: {}", e);
        } else {
            debug!("Deleted offensive message {}", message.message_id);
        }

        let mut record = self.store.record_violation(message.author_id).await;

        warn!("PROFANITY VIOLATION DETECTED");
        warn!("User: {}", message.author_tag);
        warn!("Message: \"{}\"", message.content);
        warn!("Bad words found: {}", matched_words.join(", "));
        warn!("Violation count: {}/{}", record.count, threshold);

        let mut notice = format!(
            "**{}**, your message contained inappropriate language and has been deleted.\n",
            message.author_name
        );
        notice.push_str(&format!("Warning {}/{}\n", record.count, threshold));

        let action = match record.state(threshold) {
            ViolationState::Disconnected => {
                let disconnected = match self
                    .presence
                    .force_disconnect_user(message.guild_id, message.author_id, DISCONNECT_REASON)
                    .await
                {
                    Ok(found) => found,
                    Err(e) => {
                        error!("Error disconnecting user {}: {}", message.author_tag, e);
                        false
                    }
                };

                if disconnected {
                    self.store.mark_disconnected(message.author_id).await;
                    self.store
                        .schedule_reset(message.author_id, settings.disconnect_duration())
                        .await;
                    record.is_disconnected = true;
                    notice.push_str(&format!(
                        "You have been disconnected from voice channels for {} minutes due to repeated violations.",
                        format_minutes(settings.disconnect_duration_ms)
                    ));
                    EscalationAction::Disconnected
                } else {
                    notice.push_str(
                        "Could not disconnect you from voice channel, but you have reached the maximum warnings.",
                    );
                    EscalationAction::DisconnectFailed
                }
            }
            ViolationState::Warned(_) | ViolationState::Clean => {
                notice.push_str("Please keep the chat clean. Further violations will result in voice disconnection.");
                EscalationAction::Warned
            }
        };

        if let Err(e) = self.platform.send_message(message.channel_id, &notice).await {
            error!("Could not send warning message: {}", e);
        }

        if settings.log_violations {
            self.append_log(message, &matched_words, &record).await;
        }

        info!("Violation handled for {}: {:?}", message.author_tag, action);

        EscalationOutcome {
            action,
            record,
            matched_words,
        }
    }

    async fn append_log(&self, message: &ChatMessage, matched_words: &[String], record: &ViolationRecord) {
        let Some(log) = &self.log else {
            return;
        };

        let entry = ViolationLogEntry {
            timestamp: chrono::Utc::now(),
            user_id: message.author_id,
            username: message.author_tag.clone(),
            channel_id: message.channel_id,
            channel_name: message.channel_name.clone(),
            message: message.content.clone(),
            found_words: matched_words.to_vec(),
            violation_count: record.count,
            disconnected: record.is_disconnected,
        };

        if let Err(e) = log.append(&entry).await {
            error!("Error logging violation: {}", e);
        }
    }
}

/// Render milliseconds as minutes, dropping a trailing ".0"
pub(crate) fn format_minutes(ms: u64) -> String {
    let minutes = ms as f64 / 60_000.0;
    if minutes.fract() == 0.0 {
        format!("{}", minutes as u64)
    } else {
        format!("{:.1}", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterDocument;
    use crate::platforms::mock::{MockPlatform, PlatformCall};
    use crate::types::{ChannelId, GuildId, MessageId, UserId};
    use std::time::Duration;
    use tempfile::tempdir;

    const GUILD: GuildId = GuildId(1);
    const VOICE: ChannelId = ChannelId(10);
    const TEXT: ChannelId = ChannelId(20);
    const USER: UserId = UserId(5);

    struct Fixture {
        platform: Arc<MockPlatform>,
        store: Arc<ViolationStore>,
        policy: EscalationPolicy,
    }

    fn fixture(settings: ProfanitySettings, log: Option<ViolationLog>) -> Fixture {
        let platform = Arc::new(MockPlatform::new());
        platform.add_channel(GUILD, VOICE, "lounge");
        platform.place_member(GUILD, VOICE, USER, "eve", false);

        let filter = Arc::new(FilterStore::in_memory(FilterDocument {
            bad_words: vec!["heck".to_string(), "darn".to_string()],
            settings,
        }));
        let store = Arc::new(ViolationStore::new());
        let presence = Arc::new(PresenceController::with_settle_delay(
            platform.clone(),
            Duration::from_millis(1),
        ));
        let policy = EscalationPolicy::new(platform.clone(), presence, store.clone(), filter, log);

        Fixture { platform, store, policy }
    }

    fn message(id: u64, content: &str) -> ChatMessage {
        ChatMessage {
            message_id: MessageId(id),
            guild_id: GUILD,
            channel_id: TEXT,
            channel_name: "general".to_string(),
            author_id: USER,
            author_tag: "eve#0001".to_string(),
            author_name: "eve".to_string(),
            author_is_bot: false,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    fn settings(threshold: u32) -> ProfanitySettings {
        ProfanitySettings {
            warning_threshold: threshold,
            disconnect_duration_ms: 60_000,
            log_violations: false,
            ..ProfanitySettings::default()
        }
    }

    #[tokio::test]
    async fn test_warns_until_threshold_then_disconnects() {
        let f = fixture(settings(3), None);

        for n in 1..=2 {
            let outcome = f.policy.handle_message(&message(n, "oh heck")).await.unwrap();
            assert_eq!(outcome.action, EscalationAction::Warned);
            assert_eq!(outcome.record.count, n as u32);
        }
        assert_eq!(f.platform.count_calls(|c| matches!(c, PlatformCall::DisconnectMember(..))), 0);

        let outcome = f.policy.handle_message(&message(3, "HECK")).await.unwrap();
        assert_eq!(outcome.action, EscalationAction::Disconnected);
        assert!(outcome.record.is_disconnected);
        assert!(f.store.get(USER).await.unwrap().is_disconnected);
        assert!(f.store.has_pending_reset(USER).await);

        assert_eq!(
            f.platform.count_calls(|c| matches!(c, PlatformCall::DisconnectMember(_, _, reason) if reason == DISCONNECT_REASON)),
            1
        );
        assert_eq!(f.platform.count_calls(|c| matches!(c, PlatformCall::DeleteMessage(..))), 3);

        let notices = f.platform.sent_messages();
        assert!(notices[0].contains("Warning 1/3"));
        assert!(notices[2].contains("disconnected from voice channels for 1 minutes"));
    }

    #[tokio::test]
    async fn test_over_threshold_attempts_exactly_one_disconnect() {
        let f = fixture(settings(1), None);
        f.store.record_violation(USER).await;

        let outcome = f.policy.handle_message(&message(1, "darn")).await.unwrap();
        assert_ne!(outcome.action, EscalationAction::Warned);
        assert_eq!(f.platform.count_calls(|c| matches!(c, PlatformCall::DisconnectMember(..))), 1);
    }

    #[tokio::test]
    async fn test_failed_disconnect_still_notifies() {
        let f = fixture(settings(1), None);
        f.platform.fail_member_disconnects();

        let outcome = f.policy.handle_message(&message(1, "heck")).await.unwrap();
        assert_eq!(outcome.action, EscalationAction::DisconnectFailed);
        assert!(!f.store.get(USER).await.unwrap().is_disconnected);
        assert!(!f.store.has_pending_reset(USER).await);
        assert!(f.platform.sent_messages()[0].contains("Could not disconnect you"));
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_fatal() {
        let f = fixture(settings(3), None);
        f.platform.fail_deletes();

        let outcome = f.policy.handle_message(&message(1, "heck")).await.unwrap();
        assert_eq!(outcome.action, EscalationAction::Warned);
        assert_eq!(f.platform.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_users_outside_voice_are_ignored() {
        let f = fixture(settings(3), None);
        f.platform.remove_member(GUILD, USER);

        assert!(f.policy.handle_message(&message(1, "heck")).await.is_none());
        assert!(f.store.get(USER).await.is_none());
        assert!(f.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bots_and_disabled_filter_are_ignored() {
        let mut bot_message = message(1, "heck");
        bot_message.author_is_bot = true;
        let f = fixture(settings(3), None);
        assert!(f.policy.handle_message(&bot_message).await.is_none());

        let disabled = ProfanitySettings {
            enabled: false,
            ..settings(3)
        };
        let f = fixture(disabled, None);
        assert!(f.policy.handle_message(&message(2, "heck")).await.is_none());
    }

    #[tokio::test]
    async fn test_clean_message_has_no_side_effects() {
        let f = fixture(settings(3), None);
        assert!(f.policy.handle_message(&message(1, "hello there")).await.is_none());
        assert!(f.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_violations_are_logged_when_enabled() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("violations.log");
        let logging = ProfanitySettings {
            log_violations: true,
            ..settings(2)
        };
        let f = fixture(logging, Some(ViolationLog::new(&path)));

        f.policy.handle_message(&message(1, "heck")).await.unwrap();
        f.policy.handle_message(&message(2, "darn and heck")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["disconnected"], false);
        assert_eq!(entries[1]["violationCount"], 2);
        assert_eq!(entries[1]["disconnected"], true);
        assert_eq!(entries[1]["foundWords"], serde_json::json!(["heck", "darn"]));
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(300_000), "5");
        assert_eq!(format_minutes(90_000), "1.5");
    }
}
