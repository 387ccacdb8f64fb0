use std::path::PathBuf;
use std::time::Duration;

use gist_sync::orchestrator::DEFAULT_CONTAINER_DESCRIPTION;
use gist_sync::{DEFAULT_MAX_FILE_SIZE, MAX_CONFLICT_RETRIES, RetryPolicy, SyncSettings};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_BACKUP_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_SECS: u64 = 2;
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 30;

/// User settings for sync, stored as TOML next to the token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Falls back to the host name when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    pub api_base: String,
    pub container_description: String,
    pub max_file_size_bytes: u64,
    pub create_backup: bool,
    /// Only used when this machine creates the shared manifest.
    pub backup_retention_days: u32,
    /// Manifest merges attempted before a push reports a conflict.
    pub conflict_retries: u32,
    /// Attempts per remote request, including the first.
    pub retry_attempts: u32,
    pub retry_initial_delay_secs: u64,
    pub retry_max_delay_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            machine_name: None,
            storage_dir: None,
            api_base: DEFAULT_API_BASE.to_string(),
            container_description: DEFAULT_CONTAINER_DESCRIPTION.to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            create_backup: false,
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            conflict_retries: MAX_CONFLICT_RETRIES,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_initial_delay_secs: DEFAULT_RETRY_INITIAL_DELAY_SECS,
            retry_max_delay_secs: DEFAULT_RETRY_MAX_DELAY_SECS,
        }
    }
}

impl SyncConfig {
    pub fn sync_settings(&self, machine_name: &str, storage_dir: PathBuf) -> SyncSettings {
        let mut settings = SyncSettings::new(machine_name, storage_dir);
        settings.container_description = self.container_description.clone();
        settings.max_file_size_bytes = self.max_file_size_bytes;
        settings.default_retention_days = self.backup_retention_days;
        settings.max_conflict_retries = self.conflict_retries;
        settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts)
            .with_initial_delay(Duration::from_secs(self.retry_initial_delay_secs))
            .with_max_delay(Duration::from_secs(self.retry_max_delay_secs))
    }
}
