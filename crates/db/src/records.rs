use rusqlite::params;
use usage_core::UsageRecord;

use crate::Db;
use crate::error::Result;
use crate::helpers::{RECORD_COLUMNS, row_to_usage_record};

impl Db {
    /// Bulk insert used by local ingestion. Records already present under the
    /// `(session_id, message_uuid)` key are skipped.
    pub fn insert_usage_records(&mut self, records: &[UsageRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO usage_records (
                  session_id, message_uuid, timestamp, model, total_tokens, input_tokens,
                  output_tokens, cache_creation_tokens, cache_read_tokens, folder, git_branch,
                  version, date
                ) VALUES (
                  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
                )
                "#,
            )?;
            for record in records {
                let rows = stmt.execute(params![
                    record.session_id,
                    record.message_uuid,
                    record.timestamp,
                    record.model,
                    record.total_tokens as i64,
                    record.input_tokens as i64,
                    record.output_tokens as i64,
                    record.cache_creation_tokens as i64,
                    record.cache_read_tokens as i64,
                    record.folder,
                    record.git_branch,
                    record.version,
                    record.record_date(),
                ])?;
                if rows > 0 {
                    inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count_records(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM usage_records", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Every record in timestamp order. Date selection happens on the
    /// parsed record date, not on the stored column.
    pub fn list_records(&self) -> Result<Vec<UsageRecord>> {
        let sql = format!(
            "SELECT {} FROM usage_records ORDER BY timestamp ASC, id ASC",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], row_to_usage_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
