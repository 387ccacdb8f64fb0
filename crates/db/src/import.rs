use rusqlite::{Transaction, params};
use usage_core::UsageRecord;

use crate::Db;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// A single write transaction for importing a bundle.
///
/// Each insert reports its own outcome so the caller can keep going after a
/// bad record. Dropping the batch without [`ImportBatch::commit`] rolls back
/// everything written through it.
pub struct ImportBatch<'a> {
    tx: Transaction<'a>,
    machine_name: Option<String>,
}

impl Db {
    pub fn begin_import(&mut self, machine_name: Option<&str>) -> Result<ImportBatch<'_>> {
        let tx = self.conn.transaction()?;
        Ok(ImportBatch {
            tx,
            machine_name: machine_name.map(str::to_string),
        })
    }
}

impl ImportBatch<'_> {
    /// Inserts one record; a uniqueness violation on the natural key is a
    /// duplicate, not an error.
    pub fn insert(&mut self, record: &UsageRecord) -> Result<InsertOutcome> {
        let mut stmt = self.tx.prepare_cached(
            r#"
            INSERT INTO usage_records (
              session_id, message_uuid, timestamp, model, total_tokens, input_tokens,
              output_tokens, cache_creation_tokens, cache_read_tokens, folder, git_branch,
              version, date, message_type, machine_name
            ) VALUES (
              ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'assistant', ?14
            )
            "#,
        )?;
        let result = stmt.execute(params![
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
            self.machine_name,
        ]);
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) => {
                let err = crate::error::DbError::from(err);
                if err.is_unique_violation() {
                    Ok(InsertOutcome::Duplicate)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
