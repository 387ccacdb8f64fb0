#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use usage_core::UsageRecord;
use usage_db::Db;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn make_record(uuid: &str, timestamp: &str) -> UsageRecord {
    UsageRecord {
        session_id: "session-a".to_string(),
        message_uuid: uuid.to_string(),
        timestamp: timestamp.to_string(),
        model: Some("claude-sonnet-4-20250514".to_string()),
        total_tokens: 150,
        input_tokens: 100,
        output_tokens: 50,
        cache_creation_tokens: 0,
        cache_read_tokens: 0,
        folder: "/work/project".to_string(),
        git_branch: Some("main".to_string()),
        version: "1.0.0".to_string(),
        date: timestamp[..10].to_string(),
    }
}

pub fn insert_records(db: &mut Db, records: Vec<UsageRecord>) {
    db.insert_usage_records(&records).expect("insert records");
}
