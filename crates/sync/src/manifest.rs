//! The replicated index of machines, their data files and backups.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

const DATA_FILE_PREFIX: &str = "usage_data_";
const BACKUP_MARKER: &str = "_backup_";
const JSON_EXTENSION: &str = ".json";

/// `usage_data_<machine><suffix>.json`
pub fn data_filename(machine_name: &str, suffix: &str) -> String {
    format!("{DATA_FILE_PREFIX}{machine_name}{suffix}{JSON_EXTENSION}")
}

/// Dated backup name for a primary data file:
/// `usage_data_laptop.json` becomes `usage_data_laptop_backup_20250102.json`.
pub fn backup_filename(primary_file: &str, date: NaiveDate) -> String {
    let stem = primary_file
        .strip_suffix(JSON_EXTENSION)
        .unwrap_or(primary_file);
    format!(
        "{stem}{BACKUP_MARKER}{}{JSON_EXTENSION}",
        date.format("%Y%m%d")
    )
}

/// Calendar date embedded in a backup filename.
pub fn backup_date(filename: &str) -> Option<NaiveDate> {
    let (_, tail) = filename.rsplit_once(BACKUP_MARKER)?;
    let digits = tail.strip_suffix(JSON_EXTENSION).unwrap_or(tail);
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineEntry {
    pub machine_name: String,
    pub last_sync: DateTime<Utc>,
    #[serde(default)]
    pub last_record_date: Option<String>,
    #[serde(default)]
    pub total_records: u64,
    /// Primary file. Always set so readers that predate chunking still work.
    pub current_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_files: Option<Vec<String>>,
    /// Most recent first.
    #[serde(default)]
    pub backups: Vec<String>,
}

impl MachineEntry {
    /// The authoritative file list: `data_files` when present, otherwise the
    /// single `current_file`.
    pub fn files(&self) -> Vec<String> {
        match &self.data_files {
            Some(files) if !files.is_empty() => files.clone(),
            _ if !self.current_file.is_empty() => vec![self.current_file.clone()],
            _ => Vec::new(),
        }
    }
}

/// What a push records about its own machine.
#[derive(Debug, Clone)]
pub struct MachineUpdate {
    pub machine_name: String,
    /// In upload order; the first one becomes `current_file`.
    pub files: Vec<String>,
    pub chunked: bool,
    pub total_records: u64,
    pub last_record_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestStatistics {
    pub total_machines: usize,
    pub total_records: u64,
    pub total_backups: usize,
    pub oldest_sync: Option<DateTime<Utc>>,
    pub newest_sync: Option<DateTime<Utc>>,
    pub retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub machines: Vec<MachineEntry>,
    #[serde(default = "default_retention_days")]
    pub backup_retention_days: u32,
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Manifest {
    pub fn new(backup_retention_days: u32, now: DateTime<Utc>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            last_updated: now,
            machines: Vec::new(),
            backup_retention_days,
        }
    }

    /// Parses and validates a manifest document. Any structural problem,
    /// including a repeated machine name, is a [`SyncError::Manifest`].
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)
            .map_err(|err| SyncError::Manifest(format!("invalid manifest: {err}")))?;
        let mut seen = HashSet::new();
        for machine in &manifest.machines {
            if machine.machine_name.is_empty() {
                return Err(SyncError::Manifest(
                    "invalid manifest: empty machine_name".to_string(),
                ));
            }
            if !seen.insert(machine.machine_name.as_str()) {
                return Err(SyncError::Manifest(format!(
                    "invalid manifest: machine '{}' listed twice",
                    machine.machine_name
                )));
            }
        }
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn machine(&self, machine_name: &str) -> Option<&MachineEntry> {
        self.machines
            .iter()
            .find(|machine| machine.machine_name == machine_name)
    }

    fn machine_mut(&mut self, machine_name: &str) -> Option<&mut MachineEntry> {
        self.machines
            .iter_mut()
            .find(|machine| machine.machine_name == machine_name)
    }

    pub fn machine_names(&self) -> Vec<String> {
        self.machines
            .iter()
            .map(|machine| machine.machine_name.clone())
            .collect()
    }

    /// Files to download for `machine_name`; empty when it is unknown.
    pub fn data_files(&self, machine_name: &str) -> Vec<String> {
        self.machine(machine_name)
            .map(MachineEntry::files)
            .unwrap_or_default()
    }

    /// Moves `last_updated` forward, never back.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Inserts or replaces the machine's entry. Existing backups survive.
    pub fn add_machine(&mut self, update: MachineUpdate, now: DateTime<Utc>) {
        let current_file = update
            .files
            .first()
            .cloned()
            .unwrap_or_else(|| data_filename(&update.machine_name, ""));
        let data_files = if update.chunked && !update.files.is_empty() {
            Some(update.files)
        } else {
            None
        };
        let backups = self
            .machine(&update.machine_name)
            .map(|existing| existing.backups.clone())
            .unwrap_or_default();
        let entry = MachineEntry {
            machine_name: update.machine_name,
            last_sync: now,
            last_record_date: update.last_record_date,
            total_records: update.total_records,
            current_file,
            data_files,
            backups,
        };
        match self.machine_mut(&entry.machine_name) {
            Some(existing) => *existing = entry,
            None => self.machines.push(entry),
        }
        self.touch(now);
    }

    /// Records a backup at the front of the machine's list. Returns `false`
    /// when it was already recorded.
    pub fn add_backup(
        &mut self,
        machine_name: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let machine = self.machine_mut(machine_name).ok_or_else(|| {
            SyncError::Manifest(format!("machine '{machine_name}' is not in the manifest"))
        })?;
        if machine.backups.iter().any(|backup| backup == filename) {
            return Ok(false);
        }
        machine.backups.insert(0, filename.to_string());
        self.touch(now);
        Ok(true)
    }

    pub fn remove_backup(&mut self, machine_name: &str, filename: &str, now: DateTime<Utc>) {
        let Some(machine) = self.machine_mut(machine_name) else {
            return;
        };
        let before = machine.backups.len();
        machine.backups.retain(|backup| backup != filename);
        if machine.backups.len() != before {
            self.touch(now);
        }
    }

    /// Backups of `machine_name` dated before `today - backup_retention_days`.
    /// Names without a parseable date are never returned.
    pub fn expired_backups(&self, machine_name: &str, today: NaiveDate) -> Vec<String> {
        let Some(machine) = self.machine(machine_name) else {
            return Vec::new();
        };
        let cutoff = today - Duration::days(i64::from(self.backup_retention_days));
        machine
            .backups
            .iter()
            .filter(|backup| backup_date(backup).is_some_and(|date| date < cutoff))
            .cloned()
            .collect()
    }

    pub fn is_newer_than(&self, instant: DateTime<Utc>) -> bool {
        self.last_updated > instant
    }

    /// Per-machine last-writer-wins merge.
    ///
    /// Machines present on one side are kept as they are. For a machine on
    /// both sides the entry with the later `last_sync` wins (ties favour
    /// `self`) and the backup lists are unioned. `last_updated` is the later
    /// of the two and the retention policy always comes from `self`.
    pub fn merge(&self, other: &Manifest) -> Manifest {
        let mut machines = Vec::with_capacity(self.machines.len() + other.machines.len());
        for local in &self.machines {
            let merged = match other.machine(&local.machine_name) {
                Some(remote) => {
                    let mut winner = if local.last_sync >= remote.last_sync {
                        local.clone()
                    } else {
                        remote.clone()
                    };
                    winner.backups = union_backups(&local.backups, &remote.backups);
                    winner
                }
                None => local.clone(),
            };
            machines.push(merged);
        }
        for remote in &other.machines {
            if self.machine(&remote.machine_name).is_none() {
                machines.push(remote.clone());
            }
        }
        Manifest {
            version: self.version.clone(),
            last_updated: self.last_updated.max(other.last_updated),
            machines,
            backup_retention_days: self.backup_retention_days,
        }
    }

    pub fn statistics(&self) -> ManifestStatistics {
        ManifestStatistics {
            total_machines: self.machines.len(),
            total_records: self.machines.iter().map(|machine| machine.total_records).sum(),
            total_backups: self.machines.iter().map(|machine| machine.backups.len()).sum(),
            oldest_sync: self.machines.iter().map(|machine| machine.last_sync).min(),
            newest_sync: self.machines.iter().map(|machine| machine.last_sync).max(),
            retention_days: self.backup_retention_days,
        }
    }
}

/// Deduplicated union, newest embedded date first; undated names go last.
fn union_backups(left: &[String], right: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut backups: Vec<String> = left
        .iter()
        .chain(right)
        .filter(|backup| seen.insert(backup.as_str()))
        .cloned()
        .collect();
    backups.sort_by(|a, b| {
        backup_date(b)
            .cmp(&backup_date(a))
            .then_with(|| a.cmp(b))
    });
    backups
}
