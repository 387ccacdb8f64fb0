use std::path::PathBuf;

use usage_db::StoreLayout;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::services::AppServices;
use crate::startup::{AppPaths, ensure_app_data_dir, resolve_machine_name};

/// Resolved settings for one run of the sync tool.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub paths: AppPaths,
    pub sync: SyncConfig,
    pub machine_name: String,
}

impl AppConfig {
    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(self.paths.storage_dir.clone())
    }

    pub fn store_path(&self) -> PathBuf {
        self.layout().store_path(&self.machine_name)
    }
}

/// Application state shared by frontends.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(paths: AppPaths, sync: SyncConfig) -> Self {
        let paths = paths.with_config(&sync);
        let machine_name = resolve_machine_name(sync.machine_name.as_deref());
        let config = AppConfig {
            paths,
            sync,
            machine_name,
        };
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn initialize(&self) -> Result<()> {
        ensure_app_data_dir(&self.config.paths)
    }
}
