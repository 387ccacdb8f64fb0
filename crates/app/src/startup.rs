use std::path::PathBuf;

use crate::Result;
use crate::config::SyncConfig;

const TOKEN_FILE_NAME: &str = "gist_token.txt";
const STORAGE_DIR_NAME: &str = "stores";
const UNKNOWN_MACHINE: &str = "unknown";

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub app_data_dir: PathBuf,
    /// Per-machine stores and the machine registry.
    pub storage_dir: PathBuf,
    pub token_path: PathBuf,
}

impl AppPaths {
    pub fn new(config_dir: PathBuf, app_data_dir: PathBuf) -> Self {
        let storage_dir = app_data_dir.join(STORAGE_DIR_NAME);
        let token_path = config_dir.join(TOKEN_FILE_NAME);
        Self {
            config_dir,
            app_data_dir,
            storage_dir,
            token_path,
        }
    }

    /// Applies the configured storage directory, if any.
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        if let Some(storage_dir) = &config.storage_dir {
            self.storage_dir = storage_dir.clone();
        }
        self
    }
}

pub fn ensure_app_data_dir(paths: &AppPaths) -> Result<()> {
    std::fs::create_dir_all(&paths.app_data_dir)?;
    std::fs::create_dir_all(&paths.storage_dir)?;
    Ok(())
}

/// The configured machine name, else the host name, else `"unknown"`.
pub fn resolve_machine_name(configured: Option<&str>) -> String {
    if let Some(name) = configured.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    host_name().unwrap_or_else(|| UNKNOWN_MACHINE.to_string())
}

fn host_name() -> Option<String> {
    let from_env = ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty());
    if from_env.is_some() {
        return from_env;
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
