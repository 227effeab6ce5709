// src/bot/violation_log.rs - Append-only JSON-lines violation log

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::types::{ChannelId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationLogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub user_id: UserId,
    pub username: String,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub message: String,
    pub found_words: Vec<String>,
    pub violation_count: u32,
    pub disconnected: bool,
}

/// One JSON object per line, opened in append mode for every write.
pub struct ViolationLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ViolationLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &ViolationLogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Logged violation for {} to {}", entry.user_id, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(count: u32) -> ViolationLogEntry {
        ViolationLogEntry {
            timestamp: chrono::Utc::now(),
            user_id: UserId(5),
            username: "tester".to_string(),
            channel_id: ChannelId(6),
            channel_name: "general".to_string(),
            message: "bad message".to_string(),
            found_words: vec!["bad".to_string()],
            violation_count: count,
            disconnected: false,
        }
    }

    #[tokio::test]
    async fn test_appends_one_object_per_line() {
        let temp_dir = tempdir().unwrap();
        let log = ViolationLog::new(temp_dir.path().join("violations.log"));

        log.append(&entry(1)).await.unwrap();
        log.append(&entry(2)).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["violationCount"], 2);
        assert_eq!(second["userId"], "5");
        assert_eq!(second["channelName"], "general");
        assert_eq!(second["foundWords"][0], "bad");
        assert!(second["timestamp"].as_str().unwrap().contains('T'));
    }
}
