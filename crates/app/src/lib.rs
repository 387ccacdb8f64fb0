pub mod app;
pub mod config;
pub mod error;
pub mod services;
pub mod startup;
pub mod token;

pub use app::{AppConfig, AppState};
pub use config::SyncConfig;
pub use error::{AppError, Result};
pub use services::{
    AppServices, AppStatus, ExportSummary, FileImport, ImportReport, StatusCache, SyncService,
};
pub use startup::{AppPaths, ensure_app_data_dir, resolve_machine_name};
pub use token::{TOKEN_ENV_VAR, TokenLocation, TokenManager};
