mod status;
mod sync;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::token::TokenManager;

pub use status::StatusCache;
pub use sync::{AppStatus, ExportSummary, FileImport, ImportReport, SyncService};

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub sync: SyncService,
    pub tokens: TokenManager,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let shared = Arc::new(config.clone());
        let tokens = TokenManager::new(&config.paths.token_path);
        Self {
            sync: SyncService::new(shared, tokens.clone()),
            tokens,
        }
    }
}
