use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use usage_core::UsageRecord;
use usage_db::{
    Db, InsertOutcome, KEY_LAST_IMPORT_DATE, KEY_LAST_IMPORT_MACHINE, MachineRegistry,
    StoreLayout,
};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub new_records: u64,
    pub duplicate_records: u64,
    pub errors: u64,
}

impl ImportStats {
    pub fn add(&mut self, other: &ImportStats) {
        self.new_records += other.new_records;
        self.duplicate_records += other.duplicate_records;
        self.errors += other.errors;
    }
}

struct BundleHeader<'a> {
    machine_name: &'a str,
    export_date: &'a str,
    records: &'a [Value],
}

fn read_header(bundle: &Value) -> Result<BundleHeader<'_>> {
    let field = |name: &str| {
        bundle
            .get(name)
            .ok_or_else(|| SyncError::InvalidBundle(format!("missing field '{name}'")))
    };
    let machine_name = field("machine_name")?
        .as_str()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SyncError::InvalidBundle("machine_name must be a non-empty string".to_string()))?;
    let export_date = field("export_date")?
        .as_str()
        .ok_or_else(|| SyncError::InvalidBundle("export_date must be a string".to_string()))?;
    let records = field("records")?
        .as_array()
        .ok_or_else(|| SyncError::InvalidBundle("records must be an array".to_string()))?;
    Ok(BundleHeader {
        machine_name,
        export_date,
        records,
    })
}

fn record_label(raw: &Value) -> &str {
    raw.get("message_uuid")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

/// Merges export bundles into per-machine stores, skipping records that are
/// already present.
#[derive(Debug, Clone)]
pub struct DedupImporter {
    layout: StoreLayout,
}

impl DedupImporter {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn import_str(
        &self,
        text: &str,
        target_machine: Option<&str>,
        dry_run: bool,
    ) -> Result<ImportStats> {
        let bundle: Value = serde_json::from_str(text)
            .map_err(|err| SyncError::InvalidBundle(format!("not valid JSON: {err}")))?;
        self.import_value(&bundle, target_machine, dry_run)
    }

    /// Imports into the store of `target_machine`, or of the bundle's own
    /// machine when `None`.
    ///
    /// The bundle header is checked before the store is touched. Each record
    /// is then inserted on its own: a record already in the store counts as
    /// a duplicate and a record that cannot be read or written counts as an
    /// error, and neither stops the batch. The batch commits as a whole.
    pub fn import_value(
        &self,
        bundle: &Value,
        target_machine: Option<&str>,
        dry_run: bool,
    ) -> Result<ImportStats> {
        let header = read_header(bundle)?;
        let target = target_machine.unwrap_or(header.machine_name);
        let mut stats = ImportStats::default();

        if dry_run {
            for raw in header.records {
                match UsageRecord::deserialize(raw) {
                    Ok(_) => stats.new_records += 1,
                    Err(_) => stats.errors += 1,
                }
            }
            return Ok(stats);
        }

        let mut db = Db::open_and_migrate(self.layout.store_path(target))?;
        let mut batch = db.begin_import(Some(header.machine_name))?;
        for (index, raw) in header.records.iter().enumerate() {
            let record = match UsageRecord::deserialize(raw) {
                Ok(record) => record,
                Err(err) => {
                    warn!(index, message_uuid = record_label(raw), error = %err, "skipping malformed record");
                    stats.errors += 1;
                    continue;
                }
            };
            match batch.insert(&record) {
                Ok(InsertOutcome::Inserted) => stats.new_records += 1,
                Ok(InsertOutcome::Duplicate) => stats.duplicate_records += 1,
                Err(err) => {
                    warn!(index, message_uuid = %record.message_uuid, error = %err, "failed to import record");
                    stats.errors += 1;
                }
            }
        }
        batch.commit()?;

        db.set_sync_metadata(KEY_LAST_IMPORT_DATE, header.export_date)?;
        db.set_sync_metadata(KEY_LAST_IMPORT_MACHINE, header.machine_name)?;
        MachineRegistry::open(self.layout.registry_path())?
            .register_machine(header.machine_name, header.machine_name)?;

        debug!(
            machine = header.machine_name,
            target,
            new = stats.new_records,
            duplicate = stats.duplicate_records,
            errors = stats.errors,
            "imported bundle"
        );
        Ok(stats)
    }
}
