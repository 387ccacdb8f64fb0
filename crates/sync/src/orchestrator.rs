//! `push`, `pull` and `status` over one remote container.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use usage_db::{Db, StoreLayout};

use crate::conflict::{ConflictResolver, MAX_CONFLICT_RETRIES, fetch_manifest};
use crate::error::{Result, SyncError};
use crate::export::{ChunkedExporter, DEFAULT_MAX_FILE_SIZE};
use crate::import::{DedupImporter, ImportStats};
use crate::manifest::{
    DEFAULT_RETENTION_DAYS, MANIFEST_FILENAME, MachineUpdate, Manifest, ManifestStatistics,
    backup_filename, data_filename,
};
use crate::remote::{Container, RemoteContainer};

pub const DEFAULT_CONTAINER_DESCRIPTION: &str = "Claude Code Usage Analytics - Data Backup";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub machine_name: String,
    pub storage_dir: PathBuf,
    pub container_description: String,
    pub max_file_size_bytes: u64,
    /// Retention written into a manifest this machine creates. An existing
    /// manifest keeps its own value.
    pub default_retention_days: u32,
    /// Merges of concurrent manifest changes allowed before a push gives up.
    pub max_conflict_retries: u32,
}

impl SyncSettings {
    pub fn new(machine_name: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            storage_dir: storage_dir.into(),
            container_description: DEFAULT_CONTAINER_DESCRIPTION.to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            default_retention_days: DEFAULT_RETENTION_DAYS,
            max_conflict_retries: MAX_CONFLICT_RETRIES,
        }
    }

    pub fn own_store(&self) -> PathBuf {
        StoreLayout::new(self.storage_dir.clone()).store_path(&self.machine_name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    /// Export everything instead of starting at the watermark.
    pub force: bool,
    pub create_backup: bool,
    /// Overwrite the remote manifest without checking for concurrent
    /// changes. Entries pushed by other machines in the meantime are lost.
    pub skip_conflict_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Success,
    NothingToSync,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushStats {
    pub status: PushStatus,
    pub exported_records: u64,
    pub chunked: bool,
    pub container_id: Option<String>,
    pub backup_created: bool,
    pub conflicts_resolved: bool,
    pub backups_deleted: usize,
    pub files_uploaded: usize,
    pub files_deleted: usize,
}

impl PushStats {
    fn new(status: PushStatus, exported_records: u64) -> Self {
        Self {
            status,
            exported_records,
            chunked: false,
            container_id: None,
            backup_created: false,
            conflicts_resolved: false,
            backups_deleted: 0,
            files_uploaded: 0,
            files_deleted: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MachinePullStats {
    pub machine_name: String,
    pub files: usize,
    pub files_failed: usize,
    pub stats: ImportStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PullStats {
    pub container_id: Option<String>,
    pub machines_pulled: usize,
    pub totals: ImportStats,
    pub machines: Vec<MachinePullStats>,
    /// Requested machines the manifest does not list.
    pub skipped_machines: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteStatus {
    pub container_url: Option<String>,
    pub manifest: Option<ManifestStatistics>,
    pub machine_last_sync: Option<DateTime<Utc>>,
    pub machine_total_records: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub machine_name: String,
    pub container_id: Option<String>,
    pub last_local_export: Option<NaiveDate>,
    pub remote: Option<RemoteStatus>,
    /// Why the remote part could not be read, if it could not.
    pub remote_error: Option<String>,
}

#[derive(Debug, Default)]
struct LocalSyncState {
    last_export: Option<NaiveDate>,
    container_id: Option<String>,
}

impl LocalSyncState {
    fn load(store_path: &Path) -> Result<Self> {
        if !store_path.exists() {
            return Ok(Self::default());
        }
        let db = Db::open_read_only(store_path)?;
        Ok(Self {
            last_export: db.last_export_date()?,
            container_id: db.gist_id()?,
        })
    }
}

/// What is known locally, without any remote call.
pub fn local_status(settings: &SyncSettings) -> Result<SyncStatus> {
    let local = LocalSyncState::load(&settings.own_store())?;
    Ok(SyncStatus {
        machine_name: settings.machine_name.clone(),
        container_id: local.container_id,
        last_local_export: local.last_export,
        remote: None,
        remote_error: None,
    })
}

/// Where a container id came from. Only a container found or created in
/// this run may carry an unreadable manifest, which is then treated as
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerOrigin {
    Remembered,
    FirstContact,
}

pub struct SyncOrchestrator<R> {
    remote: R,
    settings: SyncSettings,
    layout: StoreLayout,
}

impl<R: RemoteContainer> SyncOrchestrator<R> {
    pub fn new(remote: R, settings: SyncSettings) -> Self {
        let layout = StoreLayout::new(settings.storage_dir.clone());
        Self {
            remote,
            settings,
            layout,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn own_store(&self) -> PathBuf {
        self.layout.store_path(&self.settings.machine_name)
    }

    fn local_state(&self) -> Result<LocalSyncState> {
        LocalSyncState::load(&self.own_store())
    }

    /// Exports this machine's records and publishes them with an updated
    /// manifest.
    ///
    /// The remote has no multi-request transaction. Data files go up one
    /// request each, files this machine no longer references are deleted,
    /// and the manifest is written last. A push that stops partway leaves
    /// one of two states until this machine's next successful push:
    /// uploaded data files that no manifest entry names yet (orphans), or
    /// a manifest whose entry for this machine still lists files that were
    /// replaced or already deleted. A pull in the second state imports
    /// what those files now hold and counts a missing one as an error.
    ///
    /// The conflict check ends with a manifest read, and the manifest
    /// upload is a separate request. A machine that writes the manifest
    /// inside that window is overwritten: its entry disappears until it
    /// pushes again, and the data files it uploaded stay behind unlisted.
    /// `skip_conflict_check` widens the window to the whole push.
    pub fn push(&self, options: PushOptions, now: DateTime<Utc>) -> Result<PushStats> {
        let machine = self.settings.machine_name.as_str();
        let local = self.local_state()?;
        let since = if options.force { None } else { local.last_export };

        let plan = ChunkedExporter::new(self.own_store(), machine)
            .with_max_file_size(self.settings.max_file_size_bytes)
            .export(since, now)?;
        let exported = plan.total_records();
        if exported == 0 && !options.force {
            info!(machine, since = ?since, "nothing to sync");
            return Ok(PushStats::new(PushStatus::NothingToSync, 0));
        }

        let mut stats = PushStats::new(PushStatus::Success, exported);
        stats.chunked = plan.is_chunked();
        let (container_id, origin) = self.ensure_container(local.container_id, now)?;
        stats.container_id = Some(container_id.clone());

        let remote_manifest = self.download_manifest(&container_id, origin)?;
        let base = remote_manifest
            .as_ref()
            .map(|manifest| manifest.last_updated)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut manifest = remote_manifest
            .unwrap_or_else(|| Manifest::new(self.settings.default_retention_days, now));
        let old_files = manifest.data_files(machine);

        let uploads: Vec<(String, String)> = plan
            .bundles
            .iter()
            .map(|(suffix, bundle)| -> Result<(String, String)> {
                Ok((data_filename(machine, suffix), serde_json::to_string_pretty(bundle)?))
            })
            .collect::<Result<_>>()?;
        let new_files: Vec<String> = uploads.iter().map(|(name, _)| name.clone()).collect();
        manifest.add_machine(
            MachineUpdate {
                machine_name: machine.to_string(),
                files: new_files.clone(),
                chunked: stats.chunked,
                total_records: exported,
                last_record_date: plan.newest_record_date(),
            },
            now,
        );

        if !options.skip_conflict_check {
            let resolution = ConflictResolver::new(&self.remote, &container_id)
                .with_max_retries(self.settings.max_conflict_retries)
                .unreadable_as_missing(origin == ContainerOrigin::FirstContact)
                .resolve(manifest, base)?;
            stats.conflicts_resolved = resolution.conflicts_resolved();
            manifest = resolution.manifest;
        } else {
            warn!(machine, "skipping conflict check, remote manifest will be overwritten");
        }

        if options.create_backup {
            if let Some(primary) = old_files.first() {
                let created = self.create_backup(&container_id, primary, &mut manifest, now);
                stats.backup_created = match created {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(file = %primary, error = %err, "could not create backup");
                        false
                    }
                };
            }
        }

        // One request per file keeps each request under the backend's size limit.
        for (filename, content) in uploads {
            debug!(file = %filename, bytes = content.len(), "uploading data file");
            self.remote
                .update_container(&container_id, &BTreeMap::from([(filename, Some(content))]))?;
            stats.files_uploaded += 1;
        }

        let keep: BTreeSet<&String> = new_files.iter().collect();
        let stale: BTreeMap<String, Option<String>> = old_files
            .iter()
            .filter(|file| !keep.contains(file))
            .map(|file| (file.clone(), None))
            .collect();
        if !stale.is_empty() {
            self.remote.update_container(&container_id, &stale)?;
            stats.files_deleted = stale.len();
        }

        stats.backups_deleted = self.prune_backups(&container_id, &mut manifest, now);

        self.remote.update_container(
            &container_id,
            &BTreeMap::from([(MANIFEST_FILENAME.to_string(), Some(manifest.to_json()?))]),
        )?;

        self.persist_local_state(Some(plan.export_date.date_naive()), &container_id)?;
        info!(
            machine,
            records = exported,
            files = stats.files_uploaded,
            chunked = stats.chunked,
            "push complete"
        );
        Ok(stats)
    }

    /// Imports the listed machines (all machines in the manifest when
    /// `None`) into their own local stores.
    pub fn pull(&self, machines: Option<&[String]>) -> Result<PullStats> {
        let mut stats = PullStats::default();
        let local = self.local_state()?;
        let Some((container_id, origin)) = self.locate_container(local.container_id)? else {
            warn!("no remote container found, nothing to pull");
            return Ok(stats);
        };
        stats.container_id = Some(container_id.clone());
        let manifest = match self.download_manifest(&container_id, origin)? {
            Some(manifest) => manifest,
            None => {
                warn!(container = %container_id, "remote container has no manifest");
                return Ok(stats);
            }
        };

        let requested = match machines {
            Some(names) => names.to_vec(),
            None => manifest.machine_names(),
        };
        let importer = DedupImporter::new(self.layout.clone());
        for name in requested {
            let Some(entry) = manifest.machine(&name) else {
                warn!(machine = %name, "machine not found in manifest");
                stats.skipped_machines.push(name);
                continue;
            };
            let files = entry.files();
            if files.is_empty() {
                warn!(machine = %name, "no data files listed");
                stats.skipped_machines.push(name);
                continue;
            }
            let mut machine_stats = MachinePullStats {
                machine_name: name.clone(),
                files: files.len(),
                ..MachinePullStats::default()
            };
            for file in &files {
                match self.pull_file(&container_id, file, &name, &importer) {
                    Ok(imported) => machine_stats.stats.add(&imported),
                    Err(err) => {
                        warn!(machine = %name, file = %file, error = %err, "failed to pull file");
                        machine_stats.files_failed += 1;
                        machine_stats.stats.errors += 1;
                    }
                }
            }
            stats.totals.add(&machine_stats.stats);
            stats.machines_pulled += 1;
            stats.machines.push(machine_stats);
        }

        if origin == ContainerOrigin::FirstContact {
            self.persist_local_state(None, &container_id)?;
        }
        info!(
            machines = stats.machines_pulled,
            new = stats.totals.new_records,
            duplicate = stats.totals.duplicate_records,
            errors = stats.totals.errors,
            "pull complete"
        );
        Ok(stats)
    }

    /// What is known locally, without any network call.
    pub fn local_status(&self) -> Result<SyncStatus> {
        local_status(&self.settings)
    }

    /// Local status plus whatever the remote reports. Remote failures are
    /// captured in `remote_error` rather than returned.
    pub fn status(&self) -> Result<SyncStatus> {
        let mut status = self.local_status()?;
        match self.remote_status(status.container_id.clone()) {
            Ok(Some((container_id, remote))) => {
                status.container_id = Some(container_id);
                status.remote = Some(remote);
            }
            Ok(None) => {}
            Err(err) => status.remote_error = Some(err.to_string()),
        }
        Ok(status)
    }

    /// The shared container and its file listing, if one can be found.
    pub fn container_info(&self) -> Result<Option<Container>> {
        let local = self.local_state()?;
        let Some((container_id, _)) = self.locate_container(local.container_id)? else {
            return Ok(None);
        };
        Ok(Some(self.remote.get_container(&container_id)?))
    }

    fn remote_status(&self, known: Option<String>) -> Result<Option<(String, RemoteStatus)>> {
        let Some((container_id, origin)) = self.locate_container(known)? else {
            return Ok(None);
        };
        let container = self.remote.get_container(&container_id)?;
        let manifest = self.download_manifest(&container_id, origin)?;
        let entry = manifest
            .as_ref()
            .and_then(|manifest| manifest.machine(&self.settings.machine_name));
        let remote = RemoteStatus {
            container_url: container.url,
            manifest: manifest.as_ref().map(Manifest::statistics),
            machine_last_sync: entry.map(|entry| entry.last_sync),
            machine_total_records: entry.map(|entry| entry.total_records),
        };
        Ok(Some((container_id, remote)))
    }

    /// Remembered id if the container still exists, else a container
    /// matching the description.
    fn locate_container(&self, known: Option<String>) -> Result<Option<(String, ContainerOrigin)>> {
        if let Some(id) = known {
            match self.remote.get_container(&id) {
                Ok(_) => return Ok(Some((id, ContainerOrigin::Remembered))),
                Err(err) if err.is_not_found() => {
                    warn!(container = %id, "remembered container no longer exists");
                }
                Err(err) => return Err(err.into()),
            }
        }
        let found = self
            .remote
            .find_by_description(&self.settings.container_description)?;
        if let Some(id) = &found {
            info!(container = %id, "found existing container");
        }
        Ok(found.map(|id| (id, ContainerOrigin::FirstContact)))
    }

    fn ensure_container(
        &self,
        known: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(String, ContainerOrigin)> {
        if let Some(located) = self.locate_container(known)? {
            return Ok(located);
        }
        let description = &self.settings.container_description;
        let manifest = Manifest::new(self.settings.default_retention_days, now);
        let files = BTreeMap::from([(MANIFEST_FILENAME.to_string(), manifest.to_json()?)]);
        let id = self.remote.create_container(&files, description)?;
        info!(container = %id, "created remote container");
        Ok((id, ContainerOrigin::FirstContact))
    }

    fn download_manifest(
        &self,
        container_id: &str,
        origin: ContainerOrigin,
    ) -> Result<Option<Manifest>> {
        match fetch_manifest(&self.remote, container_id) {
            Err(SyncError::Manifest(message)) if origin == ContainerOrigin::FirstContact => {
                warn!(container = %container_id, error = %message, "ignoring unreadable manifest");
                Ok(None)
            }
            other => other,
        }
    }

    fn pull_file(
        &self,
        container_id: &str,
        filename: &str,
        machine_name: &str,
        importer: &DedupImporter,
    ) -> Result<ImportStats> {
        let content = self
            .remote
            .get_file_content(container_id, filename)?
            .ok_or_else(|| SyncError::InvalidBundle(format!("{filename} is listed but missing")))?;
        importer.import_str(&content, Some(machine_name), false)
    }

    /// Copies the machine's previous primary file to today's backup name.
    /// At most one backup per machine per day.
    fn create_backup(
        &self,
        container_id: &str,
        primary: &str,
        manifest: &mut Manifest,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(content) = self.remote.get_file_content(container_id, primary)? else {
            return Ok(false);
        };
        let backup = backup_filename(primary, now.date_naive());
        if self.remote.get_container(container_id)?.has_file(&backup) {
            debug!(file = %backup, "backup for today already exists");
            return Ok(false);
        }
        self.remote
            .update_container(container_id, &BTreeMap::from([(backup.clone(), Some(content))]))?;
        manifest.add_backup(&self.settings.machine_name, &backup, now)?;
        info!(file = %backup, "created backup");
        Ok(true)
    }

    /// Deletes this machine's expired backups and drops them from the
    /// manifest. Failure leaves both untouched.
    fn prune_backups(&self, container_id: &str, manifest: &mut Manifest, now: DateTime<Utc>) -> usize {
        let machine = self.settings.machine_name.as_str();
        let expired = manifest.expired_backups(machine, now.date_naive());
        if expired.is_empty() {
            return 0;
        }
        let deletions: BTreeMap<String, Option<String>> =
            expired.iter().map(|file| (file.clone(), None)).collect();
        if let Err(err) = self.remote.update_container(container_id, &deletions) {
            warn!(count = expired.len(), error = %err, "could not delete expired backups");
            return 0;
        }
        for file in &expired {
            manifest.remove_backup(machine, file, now);
        }
        info!(count = expired.len(), "deleted expired backups");
        expired.len()
    }

    fn persist_local_state(&self, export_date: Option<NaiveDate>, container_id: &str) -> Result<()> {
        let path = self.own_store();
        if !path.exists() {
            return Ok(());
        }
        let db = Db::open_and_migrate(&path)?;
        if let Some(date) = export_date {
            db.set_last_export_date(date)?;
        }
        db.set_gist_id(container_id)?;
        Ok(())
    }
}
