use chrono::NaiveDate;
use rusqlite::params;

use crate::Db;
use crate::error::Result;
use crate::migrations::table_exists;

pub const KEY_LAST_EXPORT_DATE: &str = "last_export_date";
pub const KEY_GIST_ID: &str = "gist_id";
pub const KEY_LAST_IMPORT_DATE: &str = "last_import_date";
pub const KEY_LAST_IMPORT_MACHINE: &str = "last_import_machine";

impl Db {
    pub fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        // Read-only stores created by older versions may predate the table.
        if !table_exists(&self.conn, "sync_metadata")? {
            return Ok(None);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM sync_metadata WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get::<_, String>(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sync_metadata (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// The export watermark. Older stores kept a full timestamp here, so only
    /// the leading date is read.
    pub fn last_export_date(&self) -> Result<Option<NaiveDate>> {
        let Some(value) = self.get_sync_metadata(KEY_LAST_EXPORT_DATE)? else {
            return Ok(None);
        };
        let date_part = value.get(..10).unwrap_or(&value);
        Ok(Some(NaiveDate::parse_from_str(date_part, "%Y-%m-%d")?))
    }

    pub fn set_last_export_date(&self, date: NaiveDate) -> Result<()> {
        self.set_sync_metadata(KEY_LAST_EXPORT_DATE, &date.format("%Y-%m-%d").to_string())
    }

    pub fn gist_id(&self) -> Result<Option<String>> {
        self.get_sync_metadata(KEY_GIST_ID)
    }

    pub fn set_gist_id(&self, gist_id: &str) -> Result<()> {
        self.set_sync_metadata(KEY_GIST_ID, gist_id)
    }
}
