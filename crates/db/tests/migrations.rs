use rusqlite::Connection;

#[test]
fn migrate_adds_machine_name_to_legacy_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("legacy.sqlite");
    {
        let conn = Connection::open(&db_path).expect("open conn");
        let migration = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(migration).expect("migrate 0001");
        conn.execute(
            r#"
            INSERT INTO usage_records (
              date, timestamp, session_id, message_uuid, model, folder, version,
              input_tokens, output_tokens, total_tokens
            ) VALUES (
              '2025-01-01', '2025-01-01T10:00:00Z', 's1', 'm1', 'claude', '/w', '1.0', 1, 2, 3
            )
            "#,
            [],
        )
        .expect("insert legacy record");
    }

    let mut db = usage_db::Db::open(&db_path).expect("open db");
    db.migrate().expect("migrate db");
    db.migrate().expect("migrate twice");

    let conn = Connection::open(&db_path).expect("open conn");
    let mut stmt = conn
        .prepare("PRAGMA table_info(usage_records)")
        .expect("table info");
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get(1))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("columns");
    assert!(columns.iter().any(|name| name == "machine_name"));
    assert_eq!(db.count_records().expect("count"), 1);
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sync_metadata'",
            [],
            |row| row.get(0),
        )
        .expect("tables");
    assert_eq!(tables, 1);
}
