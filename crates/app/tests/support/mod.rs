#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use usage_app::{AppPaths, AppState, SyncConfig};
use usage_core::UsageRecord;
use usage_db::Db;

pub struct TestApp {
    pub _dir: TempDir,
    pub state: AppState,
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub fn setup_app(machine: &str) -> TestApp {
    setup_app_with(SyncConfig {
        machine_name: Some(machine.to_string()),
        ..SyncConfig::default()
    })
}

pub fn setup_app_with(config: SyncConfig) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = AppPaths::new(dir.path().join("config"), dir.path().join("data"));
    let state = AppState::new(paths, config);
    state.initialize().expect("initialize");
    TestApp { _dir: dir, state }
}

pub fn make_record(uuid: &str, date: &str) -> UsageRecord {
    UsageRecord {
        session_id: "session-1".to_string(),
        message_uuid: uuid.to_string(),
        timestamp: format!("{date}T10:00:00Z"),
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

pub fn seed_own_store(app: &TestApp, count: usize) {
    let records: Vec<UsageRecord> = (0..count)
        .map(|index| make_record(&format!("msg-{index}"), &format!("2025-05-{:02}", 1 + index % 28)))
        .collect();
    let mut db = Db::open_and_migrate(app.state.config.store_path()).expect("open store");
    db.insert_usage_records(&records).expect("seed records");
}

pub fn count_records(app: &TestApp, machine: &str) -> u64 {
    let path = app.state.config.layout().store_path(machine);
    Db::open_read_only(path)
        .expect("open store")
        .count_records()
        .expect("count records")
}
