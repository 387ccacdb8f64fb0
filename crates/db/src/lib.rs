mod error;
mod helpers;
mod import;
mod layout;
mod machines;
mod metadata;
mod migrations;
mod pricing;
mod records;

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

pub use error::{DbError, Result};
pub use import::{ImportBatch, InsertOutcome};
pub use layout::StoreLayout;
pub use machines::{MachineInfo, MachineRegistry};
pub use metadata::{
    KEY_GIST_ID, KEY_LAST_EXPORT_DATE, KEY_LAST_IMPORT_DATE, KEY_LAST_IMPORT_MACHINE,
};

/// One machine's local record store.
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "busy_timeout", 30_000)?;
        Ok(Self { conn })
    }

    /// Opens an existing store without write access. Export runs through this
    /// connection so it can never mutate the source store.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self { conn })
    }

    /// Opens the store and brings its schema up to date.
    pub fn open_and_migrate(path: impl AsRef<Path>) -> Result<Self> {
        let mut db = Self::open(path)?;
        db.migrate()?;
        Ok(db)
    }
}
