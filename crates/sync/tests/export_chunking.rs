mod support;

use std::collections::HashSet;

use chrono::NaiveDate;
use gist_sync::{BYTES_PER_RECORD_ESTIMATE, ChunkedExporter};
use support::{fixed_now, make_record, month_records, seed_store, temp_dir};
use usage_db::StoreLayout;

fn exporter(storage_dir: &std::path::Path, max_records: u64) -> ChunkedExporter {
    ChunkedExporter::new(StoreLayout::new(storage_dir).store_path("laptop"), "laptop")
        .with_max_file_size(max_records * BYTES_PER_RECORD_ESTIMATE)
}

fn suffixes(plan: &gist_sync::ExportPlan) -> Vec<&str> {
    plan.bundles.iter().map(|(suffix, _)| suffix.as_str()).collect()
}

#[test]
fn small_export_is_one_unsuffixed_bundle() {
    let dir = temp_dir();
    let mut records = Vec::new();
    for month in ["2025-01", "2025-02", "2025-03", "2025-04", "2025-05"] {
        records.extend(month_records("laptop", month, 600));
    }
    seed_store(dir.path(), "laptop", &records);

    let plan = ChunkedExporter::new(StoreLayout::new(dir.path()).store_path("laptop"), "laptop")
        .export(None, fixed_now())
        .expect("export");
    assert_eq!(suffixes(&plan), vec![""]);
    assert!(!plan.is_chunked());
    assert_eq!(plan.total_records(), 3000);
    let bundle = &plan.bundles[0].1;
    assert_eq!(bundle.period, None);
    assert_eq!(bundle.chunk, None);
    assert_eq!(bundle.export_date, fixed_now());
    assert_eq!(bundle.statistics.total_records, 3000);
    assert_eq!(bundle.data_range.oldest.as_deref(), Some("2025-01-01"));
    assert_eq!(bundle.data_range.newest.as_deref(), Some("2025-05-28"));
}

#[test]
fn oversized_export_splits_by_year() {
    let dir = temp_dir();
    let mut records = month_records("laptop", "2024-11", 3);
    records.extend(month_records("laptop", "2025-02", 3));
    seed_store(dir.path(), "laptop", &records);

    let plan = exporter(dir.path(), 4).export(None, fixed_now()).expect("export");
    assert_eq!(suffixes(&plan), vec!["_2024", "_2025"]);
    assert!(plan.is_chunked());
    let year_2024 = &plan.bundles[0].1;
    assert_eq!(year_2024.period.as_deref(), Some("2024"));
    assert_eq!(year_2024.record_count(), 3);
    assert_eq!(year_2024.statistics.total_records, 3);
    assert_eq!(year_2024.statistics.total_tokens, 4_500);
}

#[test]
fn oversized_year_splits_by_month_then_parts() {
    let dir = temp_dir();
    let mut records = month_records("laptop", "2025-01", 5);
    records.extend(month_records("laptop", "2025-02", 2));
    seed_store(dir.path(), "laptop", &records);

    let plan = exporter(dir.path(), 3).export(None, fixed_now()).expect("export");
    assert_eq!(
        suffixes(&plan),
        vec!["_2025_01_p1", "_2025_01_p2", "_2025_02"]
    );
    let first = &plan.bundles[0].1;
    assert_eq!(first.chunk.as_deref(), Some("1/2"));
    assert_eq!(first.period.as_deref(), Some("2025-01"));
    assert_eq!(first.record_count(), 3);
    let second = &plan.bundles[1].1;
    assert_eq!(second.chunk.as_deref(), Some("2/2"));
    assert_eq!(second.record_count(), 2);
    assert_eq!(second.statistics.total_records, 2);
    let february = &plan.bundles[2].1;
    assert_eq!(february.chunk, None);
    assert_eq!(february.period.as_deref(), Some("2025-02"));
    assert!(plan
        .bundles
        .iter()
        .all(|(_, bundle)| bundle.export_date == fixed_now()));
}

#[test]
fn bundles_partition_records_and_respect_the_size_bound() {
    let dir = temp_dir();
    let mut records = month_records("laptop", "2023-12", 7);
    records.extend(month_records("laptop", "2024-01", 40));
    records.extend(month_records("laptop", "2024-02", 3));
    records.extend(month_records("laptop", "2025-07", 19));
    seed_store(dir.path(), "laptop", &records);
    let expected: HashSet<String> = records.iter().map(|r| r.message_uuid.clone()).collect();

    for max_records in [1u64, 2, 5, 8, 20, 45, 100] {
        let exporter = exporter(dir.path(), max_records);
        let plan = exporter.export(None, fixed_now()).expect("export");
        let mut seen = HashSet::new();
        for (suffix, bundle) in &plan.bundles {
            if plan.is_chunked() {
                assert!(
                    bundle.record_count() as u64 <= exporter.max_records_per_bundle(),
                    "bundle {suffix} too large for limit {max_records}"
                );
            }
            for record in &bundle.records {
                assert!(
                    seen.insert(record.message_uuid.clone()),
                    "{} exported twice",
                    record.message_uuid
                );
            }
            let timestamps: Vec<&str> =
                bundle.records.iter().map(|r| r.timestamp.as_str()).collect();
            let mut sorted = timestamps.clone();
            sorted.sort();
            assert_eq!(timestamps, sorted, "bundle {suffix} out of order");
        }
        assert_eq!(seen, expected, "limit {max_records}");
    }
}

#[test]
fn incremental_export_starts_at_since_date() {
    let dir = temp_dir();
    seed_store(
        dir.path(),
        "laptop",
        &[
            make_record("s1", "old", "2025-05-30", 1),
            make_record("s1", "edge", "2025-05-31", 2),
            make_record("s2", "new", "2025-06-01", 3),
        ],
    );
    let since = NaiveDate::from_ymd_opt(2025, 5, 31).expect("date");
    let plan = exporter(dir.path(), 100)
        .export(Some(since), fixed_now())
        .expect("export");
    let uuids: Vec<&str> = plan.bundles[0]
        .1
        .records
        .iter()
        .map(|r| r.message_uuid.as_str())
        .collect();
    assert_eq!(uuids, vec!["edge", "new"]);
    assert_eq!(plan.bundles[0].1.statistics.total_sessions, 2);

    let later = NaiveDate::from_ymd_opt(2025, 7, 1).expect("date");
    let empty = exporter(dir.path(), 100)
        .export(Some(later), fixed_now())
        .expect("export");
    assert_eq!(empty.total_records(), 0);
    assert_eq!(empty.bundles.len(), 1);
}

#[test]
fn incremental_split_only_counts_records_after_since() {
    let dir = temp_dir();
    let mut records = month_records("laptop", "2025-01", 10);
    records.extend(month_records("laptop", "2025-03", 4));
    seed_store(dir.path(), "laptop", &records);

    let since = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
    let plan = exporter(dir.path(), 3)
        .export(Some(since), fixed_now())
        .expect("export");
    assert_eq!(plan.total_records(), 4);
    assert_eq!(suffixes(&plan), vec!["_2025_03_p1", "_2025_03_p2"]);
}

#[test]
fn single_export_ignores_size_limit() {
    let dir = temp_dir();
    seed_store(dir.path(), "laptop", &month_records("laptop", "2025-01", 12));
    let bundle = exporter(dir.path(), 2)
        .export_single(None, fixed_now())
        .expect("export");
    assert_eq!(bundle.record_count(), 12);
    assert_eq!(bundle.chunk, None);
}

#[test]
fn loosely_dated_records_land_in_their_month_bundle() {
    let dir = temp_dir();
    let mut records = month_records("laptop", "2025-01", 2);
    let mut unpadded = make_record("s9", "unpadded", "2025-02-03", 5);
    unpadded.date = "2025-2-3".to_string();
    let mut slashed = make_record("s9", "slashed", "2025-02-04", 6);
    slashed.date = "2025/02/04".to_string();
    records.push(unpadded);
    records.push(slashed);
    seed_store(dir.path(), "laptop", &records);

    let single = exporter(dir.path(), 100).export(None, fixed_now()).expect("export");
    assert_eq!(single.total_records(), 4);

    let split = exporter(dir.path(), 2).export(None, fixed_now()).expect("export");
    assert_eq!(suffixes(&split), vec!["_2025_01", "_2025_02"]);
    assert_eq!(split.total_records(), 4);
    let february: Vec<(&str, &str)> = split.bundles[1]
        .1
        .records
        .iter()
        .map(|r| (r.message_uuid.as_str(), r.date.as_str()))
        .collect();
    assert_eq!(
        february,
        vec![("unpadded", "2025-02-03"), ("slashed", "2025-02-04")]
    );

    let since = NaiveDate::from_ymd_opt(2025, 2, 4).expect("date");
    let incremental = exporter(dir.path(), 2)
        .export(Some(since), fixed_now())
        .expect("export");
    assert_eq!(incremental.total_records(), 1);
}
