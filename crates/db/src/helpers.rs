use rusqlite::Row;
use usage_core::UsageRecord;

pub(crate) const RECORD_COLUMNS: &str = r#"
    session_id, message_uuid, timestamp, model, total_tokens, input_tokens,
    output_tokens, cache_creation_tokens, cache_read_tokens, folder, git_branch,
    version, date
"#;

pub(crate) fn row_to_usage_record(row: &Row<'_>) -> std::result::Result<UsageRecord, rusqlite::Error> {
    Ok(UsageRecord {
        session_id: row.get(0)?,
        message_uuid: row.get(1)?,
        timestamp: row.get(2)?,
        model: row.get(3)?,
        total_tokens: row.get::<_, i64>(4)?.max(0) as u64,
        input_tokens: row.get::<_, i64>(5)?.max(0) as u64,
        output_tokens: row.get::<_, i64>(6)?.max(0) as u64,
        cache_creation_tokens: row.get::<_, i64>(7)?.max(0) as u64,
        cache_read_tokens: row.get::<_, i64>(8)?.max(0) as u64,
        folder: row.get(9)?,
        git_branch: row.get(10)?,
        version: row.get(11)?,
        date: row.get(12)?,
    })
}
