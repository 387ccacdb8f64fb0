#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use gist_sync::manifest::data_filename;
use gist_sync::remote::RemoteResult;
use gist_sync::{
    Container, MANIFEST_FILENAME, MachineUpdate, Manifest, MemoryContainer, RemoteContainer,
    SyncOrchestrator, SyncSettings,
};
use tempfile::TempDir;
use usage_core::UsageRecord;
use usage_db::{Db, StoreLayout};

pub const OTHER_DEVICE: &str = "other-device";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub fn make_record(session: &str, uuid: &str, date: &str, seconds: u32) -> UsageRecord {
    UsageRecord {
        session_id: session.to_string(),
        message_uuid: uuid.to_string(),
        timestamp: format!(
            "{date}T{:02}:{:02}:{:02}Z",
            (seconds / 3600) % 24,
            (seconds / 60) % 60,
            seconds % 60
        ),
        model: Some("claude-sonnet-4-20250514".to_string()),
        total_tokens: 1_500,
        input_tokens: 1_000,
        output_tokens: 500,
        cache_creation_tokens: 0,
        cache_read_tokens: 0,
        folder: "/work/project".to_string(),
        git_branch: Some("main".to_string()),
        version: "1.0.0".to_string(),
        date: date.to_string(),
    }
}

/// `count` records spread across the days of one `YYYY-MM` month.
pub fn month_records(prefix: &str, year_month: &str, count: usize) -> Vec<UsageRecord> {
    (0..count)
        .map(|index| {
            let date = format!("{year_month}-{:02}", 1 + index % 28);
            make_record(
                &format!("{prefix}-session-{}", index / 50),
                &format!("{prefix}-{year_month}-{index}"),
                &date,
                index as u32,
            )
        })
        .collect()
}

pub fn seed_store(storage_dir: &Path, machine: &str, records: &[UsageRecord]) {
    let layout = StoreLayout::new(storage_dir);
    let mut db = Db::open_and_migrate(layout.store_path(machine)).expect("open store");
    db.insert_usage_records(records).expect("seed records");
}

pub fn store_count(storage_dir: &Path, machine: &str) -> u64 {
    let layout = StoreLayout::new(storage_dir);
    Db::open_read_only(layout.store_path(machine))
        .expect("open store")
        .count_records()
        .expect("count records")
}

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

pub fn orchestrator<R: RemoteContainer>(
    remote: R,
    machine: &str,
    storage_dir: &Path,
) -> SyncOrchestrator<R> {
    SyncOrchestrator::new(remote, SyncSettings::new(machine, storage_dir))
}

pub fn orchestrator_with_limit<R: RemoteContainer>(
    remote: R,
    machine: &str,
    storage_dir: &Path,
    max_file_size_bytes: u64,
) -> SyncOrchestrator<R> {
    let mut settings = SyncSettings::new(machine, storage_dir);
    settings.max_file_size_bytes = max_file_size_bytes;
    SyncOrchestrator::new(remote, settings)
}

pub fn remote_manifest(remote: &MemoryContainer, container_id: &str) -> Manifest {
    let text = remote
        .file(container_id, MANIFEST_FILENAME)
        .expect("manifest present");
    Manifest::from_json(&text).expect("valid manifest")
}

/// Wraps a container and, on each of the next `bumps` manifest reads,
/// first lets another device publish a newer manifest.
pub struct ConcurrentDevice<'a> {
    inner: &'a MemoryContainer,
    bumps_left: Cell<u32>,
    bumps_done: Cell<u32>,
}

impl<'a> ConcurrentDevice<'a> {
    pub fn new(inner: &'a MemoryContainer, bumps: u32) -> Self {
        Self {
            inner,
            bumps_left: Cell::new(bumps),
            bumps_done: Cell::new(0),
        }
    }

    pub fn bumps_done(&self) -> u32 {
        self.bumps_done.get()
    }

    fn bump(&self, id: &str) {
        let Some(text) = self.inner.file(id, MANIFEST_FILENAME) else {
            return;
        };
        let mut manifest = Manifest::from_json(&text).expect("valid manifest");
        let at = manifest.last_updated + Duration::minutes(1);
        manifest.add_machine(
            MachineUpdate {
                machine_name: OTHER_DEVICE.to_string(),
                files: vec![data_filename(OTHER_DEVICE, "")],
                chunked: false,
                total_records: 7,
                last_record_date: Some("2025-05-31".to_string()),
            },
            at,
        );
        self.inner.put_file(
            id,
            MANIFEST_FILENAME,
            manifest.to_json().expect("serialize manifest"),
        );
        self.bumps_done.set(self.bumps_done.get() + 1);
    }
}

impl RemoteContainer for ConcurrentDevice<'_> {
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String> {
        self.inner.create_container(files, description)
    }

    fn get_container(&self, id: &str) -> RemoteResult<Container> {
        self.inner.get_container(id)
    }

    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()> {
        self.inner.update_container(id, files)
    }

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        self.inner.find_by_description(description)
    }

    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>> {
        if filename == MANIFEST_FILENAME && self.bumps_left.get() > 0 {
            self.bumps_left.set(self.bumps_left.get() - 1);
            self.bump(id);
        }
        self.inner.get_file_content(id, filename)
    }
}
