//! Splits a machine's records into bundles small enough for one remote file.
//!
//! Sizes are estimated from the record count. The split is progressive:
//! everything in one bundle if it fits, otherwise one bundle per year, a
//! year that does not fit is split by month and a month that does not fit
//! is cut into fixed-size parts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, warn};
use usage_core::{BundleStatistics, DataRange, ExportBundle, ModelPrice, UsageRecord};
use usage_db::Db;

use crate::error::Result;

/// Calibrated above the observed average serialized record size.
pub const BYTES_PER_RECORD_ESTIMATE: u64 = 550;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 7 * 1024 * 1024;

/// Bundles produced by one export, keyed by filename suffix in
/// chronological order. All bundles share one `export_date`.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub export_date: DateTime<Utc>,
    pub bundles: Vec<(String, ExportBundle)>,
}

impl ExportPlan {
    pub fn total_records(&self) -> u64 {
        self.bundles
            .iter()
            .map(|(_, bundle)| bundle.record_count() as u64)
            .sum()
    }

    /// True unless the export is the single unsuffixed bundle.
    pub fn is_chunked(&self) -> bool {
        !matches!(self.bundles.as_slice(), [(suffix, _)] if suffix.is_empty())
    }

    pub fn newest_record_date(&self) -> Option<String> {
        self.bundles
            .iter()
            .filter_map(|(_, bundle)| bundle.data_range.newest.clone())
            .max()
    }
}

pub struct ChunkedExporter {
    store_path: PathBuf,
    machine_name: String,
    max_file_size: u64,
}

impl ChunkedExporter {
    pub fn new(store_path: impl Into<PathBuf>, machine_name: impl Into<String>) -> Self {
        Self {
            store_path: store_path.into(),
            machine_name: machine_name.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn max_records_per_bundle(&self) -> u64 {
        (self.max_file_size / BYTES_PER_RECORD_ESTIMATE).max(1)
    }

    fn fits(&self, count: u64) -> bool {
        count.saturating_mul(BYTES_PER_RECORD_ESTIMATE) <= self.max_file_size
    }

    /// Exports records dated on or after `since` (everything when `None`).
    pub fn export(&self, since: Option<NaiveDate>, now: DateTime<Utc>) -> Result<ExportPlan> {
        let Some(db) = self.open_store()? else {
            debug!(path = %self.store_path.display(), "no local store, exporting empty bundle");
            return Ok(ExportPlan {
                export_date: now,
                bundles: vec![(String::new(), self.bundle(Vec::new(), None, None, now, &[]))],
            });
        };
        let prices = db.list_model_prices()?;
        let records = dated_records(db.list_records()?, since);

        if self.fits(records.len() as u64) {
            let records = records.into_iter().map(|(_, record)| record).collect();
            return Ok(ExportPlan {
                export_date: now,
                bundles: vec![(String::new(), self.bundle(records, None, None, now, &prices))],
            });
        }

        let mut years: BTreeMap<i32, BTreeMap<u32, Vec<UsageRecord>>> = BTreeMap::new();
        for (date, record) in records {
            years
                .entry(date.year())
                .or_default()
                .entry(date.month())
                .or_default()
                .push(record);
        }

        let mut bundles = Vec::new();
        for (year, months) in years {
            let year_total: usize = months.values().map(Vec::len).sum();
            if self.fits(year_total as u64) {
                let records = months.into_values().flatten().collect();
                bundles.push((
                    format!("_{year}"),
                    self.bundle(records, Some(year.to_string()), None, now, &prices),
                ));
                continue;
            }
            for (month, records) in months {
                let year_month = format!("{year:04}-{month:02}");
                let suffix = format!("_{year:04}_{month:02}");
                if self.fits(records.len() as u64) {
                    bundles.push((
                        suffix,
                        self.bundle(records, Some(year_month), None, now, &prices),
                    ));
                    continue;
                }
                let part_size = self.max_records_per_bundle() as usize;
                let total_parts = records.len().div_ceil(part_size);
                debug!(period = %year_month, records = records.len(), total_parts, "splitting month");
                for (index, part) in records.chunks(part_size).enumerate() {
                    let number = index + 1;
                    bundles.push((
                        format!("{suffix}_p{number}"),
                        self.bundle(
                            part.to_vec(),
                            Some(year_month.clone()),
                            Some(format!("{number}/{total_parts}")),
                            now,
                            &prices,
                        ),
                    ));
                }
            }
        }

        if bundles.is_empty() {
            bundles.push((String::new(), self.bundle(Vec::new(), None, None, now, &prices)));
        }
        Ok(ExportPlan {
            export_date: now,
            bundles,
        })
    }

    /// One unsplit bundle, for writing a local export file.
    pub fn export_single(&self, since: Option<NaiveDate>, now: DateTime<Utc>) -> Result<ExportBundle> {
        let Some(db) = self.open_store()? else {
            return Ok(self.bundle(Vec::new(), None, None, now, &[]));
        };
        let prices = db.list_model_prices()?;
        let records = dated_records(db.list_records()?, since)
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        Ok(self.bundle(records, None, None, now, &prices))
    }

    fn open_store(&self) -> Result<Option<Db>> {
        if !self.store_path.exists() {
            return Ok(None);
        }
        Ok(Some(Db::open_read_only(&self.store_path)?))
    }

    fn bundle(
        &self,
        records: Vec<UsageRecord>,
        period: Option<String>,
        chunk: Option<String>,
        export_date: DateTime<Utc>,
        prices: &[ModelPrice],
    ) -> ExportBundle {
        ExportBundle {
            machine_name: self.machine_name.clone(),
            export_date,
            period,
            chunk,
            data_range: DataRange::from_records(&records),
            statistics: BundleStatistics::from_records(&records, prices),
            records,
        }
    }
}

/// Pairs each record with its calendar day and rewrites `date` to
/// `YYYY-MM-DD`, keeping those on or after `since`. Records whose day
/// cannot be read from either `date` or `timestamp` are left out of every
/// bundle.
fn dated_records(
    records: Vec<UsageRecord>,
    since: Option<NaiveDate>,
) -> Vec<(NaiveDate, UsageRecord)> {
    let mut undated = 0usize;
    let dated: Vec<(NaiveDate, UsageRecord)> = records
        .into_iter()
        .filter_map(|mut record| {
            let Some(date) = record.canonical_date() else {
                undated += 1;
                return None;
            };
            record.date = date.format("%Y-%m-%d").to_string();
            Some((date, record))
        })
        .filter(|(date, _)| since.is_none_or(|since| *date >= since))
        .collect();
    if undated > 0 {
        warn!(undated, "skipping records without a readable date");
    }
    dated
}
