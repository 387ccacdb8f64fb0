use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use gist_sync::orchestrator::SyncStatus;
use gist_sync::{
    ChunkedExporter, Container, DedupImporter, GistClient, ImportStats, PullStats, PushOptions,
    PushStats, RemoteContainer, SyncOrchestrator, SyncSettings, TokenSource, local_status,
    require_token,
};
use tracing::{info, warn};
use usage_db::{MachineInfo, MachineRegistry};

use super::{SharedConfig, StatusCache};
use crate::error::{AppError, Result};
use crate::token::{TokenLocation, TokenManager};

#[derive(Debug, Clone)]
pub struct AppStatus {
    pub token: TokenLocation,
    pub sync: SyncStatus,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub machine_name: String,
    pub records: u64,
}

#[derive(Debug, Clone)]
pub struct FileImport {
    pub path: PathBuf,
    pub result: std::result::Result<ImportStats, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub files: Vec<FileImport>,
    pub totals: ImportStats,
}

impl ImportReport {
    pub fn files_failed(&self) -> usize {
        self.files.iter().filter(|file| file.result.is_err()).count()
    }
}

/// Wires configuration and credentials into the sync engine.
///
/// The `*_with` variants take the remote explicitly; the plain variants
/// resolve the token and talk to the configured HTTP backend.
#[derive(Clone)]
pub struct SyncService {
    config: SharedConfig,
    tokens: TokenManager,
}

impl SyncService {
    pub(super) fn new(config: SharedConfig, tokens: TokenManager) -> Self {
        Self { config, tokens }
    }

    pub fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    pub fn settings(&self) -> SyncSettings {
        self.config
            .sync
            .sync_settings(&self.config.machine_name, self.config.paths.storage_dir.clone())
    }

    pub fn orchestrator<R: RemoteContainer>(&self, remote: R) -> SyncOrchestrator<R> {
        SyncOrchestrator::new(remote, self.settings())
    }

    /// Fails before any network call when no token is configured.
    pub fn connect(&self) -> Result<GistClient> {
        let token = require_token(&self.tokens)?;
        let client = GistClient::new(&self.config.sync.api_base, token)?;
        Ok(client.with_retry(self.config.sync.retry_policy()))
    }

    /// Push options for a run; `backup` overrides the configured default.
    pub fn push_options(
        &self,
        full_export: bool,
        skip_conflict_check: bool,
        backup: Option<bool>,
    ) -> PushOptions {
        PushOptions {
            force: full_export,
            create_backup: backup.unwrap_or(self.config.sync.create_backup),
            skip_conflict_check,
        }
    }

    pub fn push(&self, options: PushOptions) -> Result<PushStats> {
        let client = self.connect()?;
        self.push_with(&client, options, Utc::now())
    }

    pub fn push_with<R: RemoteContainer>(
        &self,
        remote: R,
        options: PushOptions,
        now: DateTime<Utc>,
    ) -> Result<PushStats> {
        let stats = self.orchestrator(remote).push(options, now)?;
        info!(
            machine = %self.config.machine_name,
            status = ?stats.status,
            records = stats.exported_records,
            "push finished"
        );
        Ok(stats)
    }

    pub fn pull(&self, machines: Option<&[String]>) -> Result<PullStats> {
        let client = self.connect()?;
        self.pull_with(&client, machines)
    }

    pub fn pull_with<R: RemoteContainer>(
        &self,
        remote: R,
        machines: Option<&[String]>,
    ) -> Result<PullStats> {
        Ok(self.orchestrator(remote).pull(machines)?)
    }

    /// Without a token only the local half of the status is reported.
    pub fn status(&self) -> Result<AppStatus> {
        if self.tokens.get_token().is_none() {
            return Ok(AppStatus {
                token: TokenLocation::NotConfigured,
                sync: local_status(&self.settings())?,
            });
        }
        let client = self.connect()?;
        self.status_with(&client)
    }

    pub fn status_with<R: RemoteContainer>(&self, remote: R) -> Result<AppStatus> {
        Ok(AppStatus {
            token: self.tokens.location(),
            sync: self.orchestrator(remote).status()?,
        })
    }

    /// The shared container's file listing, or `None` before the first push.
    pub fn container_info(&self) -> Result<Option<Container>> {
        let client = self.connect()?;
        self.container_info_with(&client)
    }

    pub fn container_info_with<R: RemoteContainer>(&self, remote: R) -> Result<Option<Container>> {
        Ok(self.orchestrator(remote).container_info()?)
    }

    pub fn status_cached(
        &self,
        previous: Option<StatusCache>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<StatusCache> {
        match previous {
            Some(cache) if cache.is_fresh(now, ttl) => Ok(cache),
            _ => Ok(StatusCache::new(self.status()?, now)),
        }
    }

    pub fn status_cached_with<R: RemoteContainer>(
        &self,
        remote: R,
        previous: Option<StatusCache>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<StatusCache> {
        match previous {
            Some(cache) if cache.is_fresh(now, ttl) => Ok(cache),
            _ => Ok(StatusCache::new(self.status_with(remote)?, now)),
        }
    }

    /// Writes this machine's records as one unchunked bundle.
    pub fn export_to_file(
        &self,
        output: &Path,
        since: Option<NaiveDate>,
    ) -> Result<ExportSummary> {
        let machine = self.config.machine_name.as_str();
        let bundle = ChunkedExporter::new(self.config.store_path(), machine)
            .export_single(since, Utc::now())?;
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&bundle)?;
        std::fs::write(output, text)
            .map_err(|err| AppError::Message(format!("write {}: {}", output.display(), err)))?;
        Ok(ExportSummary {
            path: output.to_path_buf(),
            machine_name: machine.to_string(),
            records: bundle.records.len() as u64,
        })
    }

    /// Imports one bundle file into `machine`'s store, or the bundle's own
    /// machine when `None`.
    pub fn import_file(
        &self,
        path: &Path,
        machine: Option<&str>,
        dry_run: bool,
    ) -> Result<ImportStats> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| AppError::Message(format!("read {}: {}", path.display(), err)))?;
        let importer = DedupImporter::new(self.config.layout());
        Ok(importer.import_str(&text, machine, dry_run)?)
    }

    /// Imports each file in turn. A failing file is reported and does not
    /// stop the rest.
    pub fn import_files(
        &self,
        paths: &[PathBuf],
        machine: Option<&str>,
        dry_run: bool,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        for path in paths {
            let result = match self.import_file(path, machine, dry_run) {
                Ok(stats) => {
                    report.totals.add(&stats);
                    Ok(stats)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "import failed");
                    Err(err.to_string())
                }
            };
            report.files.push(FileImport {
                path: path.clone(),
                result,
            });
        }
        report
    }

    pub fn machines(&self, include_inactive: bool) -> Result<Vec<MachineInfo>> {
        let registry = MachineRegistry::open(self.config.layout().registry_path())?;
        Ok(registry.list_machines(include_inactive)?)
    }
}
