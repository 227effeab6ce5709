// src/config/mod.rs - Environment configuration and the persisted filter document

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::types::{ChannelId, GuildId};

pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_FILTER_PATH: &str = "badwords.json";
pub const DEFAULT_VIOLATION_LOG_PATH: &str = "profanity_violations.log";
pub const DEFAULT_WEB_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid filter settings: {0}")]
    InvalidSettings(String),
}

/// Runtime guard flags. Initialised from the environment, mutated only by
/// commands, never persisted.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub auto_guard_enabled: bool,
    pub dynamic_scan_enabled: bool,
    pub scan_interval: Duration,
    pub excluded_channel_ids: HashSet<ChannelId>,
    pub primary_channel_id: Option<ChannelId>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            auto_guard_enabled: true,
            dynamic_scan_enabled: true,
            scan_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
            excluded_channel_ids: HashSet::new(),
            primary_channel_id: None,
        }
    }
}

impl GuardConfig {
    /// Load guard flags from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let auto_guard_enabled = parse_bool_var("AUTO_GUARD")?.unwrap_or(defaults.auto_guard_enabled);
        let dynamic_scan_enabled =
            parse_bool_var("DYNAMIC_SCAN")?.unwrap_or(defaults.dynamic_scan_enabled);

        let scan_interval = match env::var("SCAN_INTERVAL_MS") {
            Ok(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnv {
                    name: "SCAN_INTERVAL_MS",
                    reason: e.to_string(),
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidEnv {
                        name: "SCAN_INTERVAL_MS",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_millis(ms)
            }
            Err(_) => defaults.scan_interval,
        };

        let excluded_channel_ids = match env::var("EXCLUDED_CHANNELS") {
            Ok(raw) => parse_channel_list(&raw).map_err(|reason| ConfigError::InvalidEnv {
                name: "EXCLUDED_CHANNELS",
                reason,
            })?,
            Err(_) => HashSet::new(),
        };

        let primary_channel_id = parse_id_var::<ChannelId>("GUARD_CHANNEL_ID")?;
        if primary_channel_id.is_none() {
            warn!("GUARD_CHANNEL_ID not set - the join command will have no target");
        }

        let config = Self {
            auto_guard_enabled,
            dynamic_scan_enabled,
            scan_interval,
            excluded_channel_ids,
            primary_channel_id,
        };
        debug!("Guard config: {:?}", config);
        Ok(config)
    }

    /// Scanning runs only while both auto-guard and dynamic scan are on
    pub fn scanning_active(&self) -> bool {
        self.auto_guard_enabled && self.dynamic_scan_enabled
    }
}

/// Credentials and registration scope for the chat platform
#[derive(Debug, Clone)]
pub struct DiscordCredentials {
    pub token: String,
    pub application_id: Option<u64>,
    /// Guild used to scope slash-command registration; global when absent
    pub command_guild_id: Option<GuildId>,
}

impl DiscordCredentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("DISCORD_TOKEN").map_err(|_| ConfigError::MissingEnv("DISCORD_TOKEN"))?;
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: "DISCORD_TOKEN",
                reason: "token is empty".to_string(),
            });
        }

        let application_id = parse_id_var::<u64>("CLIENT_ID")?;
        let command_guild_id = parse_id_var::<GuildId>("GUILD_ID")?;

        Ok(Self {
            token,
            application_id,
            command_guild_id,
        })
    }
}

/// Everything the process reads from its environment at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord: DiscordCredentials,
    pub guard: GuardConfig,
    pub filter_path: PathBuf,
    pub violation_log_path: PathBuf,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let discord = DiscordCredentials::from_env()?;
        let guard = GuardConfig::from_env()?;

        let filter_path = env::var("FILTER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FILTER_PATH));
        let violation_log_path = env::var("VIOLATION_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_VIOLATION_LOG_PATH));

        let web_port = match env::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidEnv {
                name: "PORT",
                reason: e.to_string(),
            })?,
            Err(_) => DEFAULT_WEB_PORT,
        };

        Ok(Self {
            discord,
            guard,
            filter_path,
            violation_log_path,
            web_port,
        })
    }
}

fn parse_bool_var(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidEnv {
                name,
                reason: format!("expected a boolean, got '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_id_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::InvalidEnv {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn parse_channel_list(raw: &str) -> Result<HashSet<ChannelId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ChannelId>().map_err(|e| format!("'{}': {}", s, e)))
        .collect()
}

// =================================================================
// PROFANITY FILTER DOCUMENT
// =================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfanitySettings {
    pub enabled: bool,
    pub case_sensitive: bool,
    /// Violations tolerated before a voice disconnect
    #[serde(rename = "warningCount")]
    pub warning_threshold: u32,
    /// Milliseconds a disconnected user stays flagged before reset
    #[serde(rename = "disconnectDuration")]
    pub disconnect_duration_ms: u64,
    pub log_violations: bool,
}

impl Default for ProfanitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            case_sensitive: false,
            warning_threshold: 3,
            disconnect_duration_ms: 300_000,
            log_violations: true,
        }
    }
}

impl ProfanitySettings {
    pub fn disconnect_duration(&self) -> Duration {
        Duration::from_millis(self.disconnect_duration_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warning_threshold < 1 {
            return Err(ConfigError::InvalidSettings(
                "warningCount must be at least 1".to_string(),
            ));
        }
        if self.disconnect_duration_ms == 0 {
            return Err(ConfigError::InvalidSettings(
                "disconnectDuration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk shape of the word list and filter settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDocument {
    pub bad_words: Vec<String>,
    pub settings: ProfanitySettings,
}

/// Holds the filter document in memory and rewrites it on change.
///
/// The word list is immutable after load; only `enabled` can be toggled.
pub struct FilterStore {
    path: PathBuf,
    document: RwLock<FilterDocument>,
    write_lock: Mutex<()>,
}

impl FilterStore {
    /// Load the document at `path`, creating it with defaults when missing.
    /// A malformed or invalid document is an error.
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let document = if path.exists() {
            let content = fs::read_to_string(&path).await.map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let document: FilterDocument =
                serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
                    path: path.clone(),
                    source,
                })?;
            document.settings.validate()?;
            info!("Loaded {} bad words from {}", document.bad_words.len(), path.display());
            document
        } else {
            warn!("{} not found, creating default file...", path.display());
            let document = FilterDocument::default();
            write_document(&path, &document).await?;
            document
        };

        info!(
            "Profanity filter: {}",
            if document.settings.enabled { "ENABLED" } else { "DISABLED" }
        );

        Ok(Self {
            path,
            document: RwLock::new(document),
            write_lock: Mutex::new(()),
        })
    }

    /// In-memory store that is never written to disk (tests, dry runs)
    pub fn in_memory(document: FilterDocument) -> Self {
        Self {
            path: PathBuf::new(),
            document: RwLock::new(document),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn settings(&self) -> ProfanitySettings {
        self.document.read().await.settings.clone()
    }

    pub async fn words(&self) -> Vec<String> {
        self.document.read().await.bad_words.clone()
    }

    pub async fn word_count(&self) -> usize {
        self.document.read().await.bad_words.len()
    }

    pub async fn is_enabled(&self) -> bool {
        self.document.read().await.settings.enabled
    }

    /// Flip the enabled flag, returning the new value. The in-memory value
    /// changes even when persisting fails; the error is returned.
    pub async fn toggle_enabled(&self) -> (bool, Result<(), ConfigError>) {
        // Held across flip and write so the file never lags behind memory
        let _writer = self.write_lock.lock().await;
        let snapshot = {
            let mut document = self.document.write().await;
            document.settings.enabled = !document.settings.enabled;
            document.clone()
        };
        let enabled = snapshot.settings.enabled;
        info!("Profanity filter toggled: {}", if enabled { "ON" } else { "OFF" });
        (enabled, self.persist(&snapshot).await)
    }

    async fn persist(&self, document: &FilterDocument) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            debug!("In-memory filter store, skipping persist");
            return Ok(());
        }
        write_document(&self.path, document).await
    }
}

async fn write_document(path: &Path, document: &FilterDocument) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(document).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Profanity filter saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_document_is_created_with_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");

        let store = FilterStore::load_or_create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.settings().await, ProfanitySettings::default());
        assert_eq!(store.word_count().await, 0);

        let written: FilterDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, FilterDocument::default());
    }

    #[tokio::test]
    async fn test_document_uses_camel_case_field_names() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");
        std::fs::write(
            &path,
            r#"{
                "badWords": ["darn", "Heck"],
                "settings": {
                    "enabled": false,
                    "caseSensitive": true,
                    "warningCount": 2,
                    "disconnectDuration": 60000,
                    "logViolations": false
                }
            }"#,
        )
        .unwrap();

        let store = FilterStore::load_or_create(&path).await.unwrap();
        let settings = store.settings().await;
        assert!(!settings.enabled);
        assert!(settings.case_sensitive);
        assert_eq!(settings.warning_threshold, 2);
        assert_eq!(settings.disconnect_duration(), Duration::from_secs(60));
        assert_eq!(store.words().await, vec!["darn".to_string(), "Heck".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_document_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = FilterStore::load_or_create(&path).await;
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_zero_threshold_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");
        let mut document = FilterDocument::default();
        document.settings.warning_threshold = 0;
        std::fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        let result = FilterStore::load_or_create(&path).await;
        assert!(matches!(result, Err(ConfigError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn test_toggle_round_trips_to_disk() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");
        let store = FilterStore::load_or_create(&path).await.unwrap();

        let (enabled, persisted) = store.toggle_enabled().await;
        assert!(persisted.is_ok());
        assert!(!enabled);

        let on_disk: FilterDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.settings.enabled, store.is_enabled().await);

        let (enabled, _) = store.toggle_enabled().await;
        assert!(enabled);
        let on_disk: FilterDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(on_disk.settings.enabled);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_leave_disk_in_step() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("badwords.json");
        let store = Arc::new(FilterStore::load_or_create(&path).await.unwrap());

        let toggles: Vec<_> = (0..9)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.toggle_enabled().await })
            })
            .collect();
        for toggle in toggles {
            assert!(toggle.await.unwrap().1.is_ok());
        }

        // Odd number of flips from the enabled default
        assert!(!store.is_enabled().await);
        let on_disk: FilterDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.settings.enabled, store.is_enabled().await);
    }

    #[test]
    fn test_channel_list_parsing() {
        let parsed = parse_channel_list(" 1, 2 ,,3").unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains(&ChannelId(2)));

        assert!(parse_channel_list("1,abc").is_err());
    }

    #[test]
    fn test_bool_parsing() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_scanning_requires_both_flags() {
        let mut config = GuardConfig::default();
        assert!(config.scanning_active());

        config.dynamic_scan_enabled = false;
        assert!(!config.scanning_active());

        config.dynamic_scan_enabled = true;
        config.auto_guard_enabled = false;
        assert!(!config.scanning_active());
    }
}
