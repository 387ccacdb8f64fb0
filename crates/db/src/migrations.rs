use rusqlite::Connection;

use crate::Db;
use crate::error::Result;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_model_pricing.sql");
const MIGRATION_0003: &str = include_str!("../migrations/0003_sync_metadata.sql");
const MIGRATION_0004: &str = include_str!("../migrations/0004_add_machine_name.sql");

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", MIGRATION_0001),
    ("0002_model_pricing", MIGRATION_0002),
    ("0003_sync_metadata", MIGRATION_0003),
    ("0004_add_machine_name", MIGRATION_0004),
];

pub(crate) const REGISTRY_MIGRATION_0001: &str =
    include_str!("../migrations/registry/0001_machines.sql");

impl Db {
    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (name, sql) in MIGRATIONS {
            if *name == "0004_add_machine_name" {
                if !table_has_column(&tx, "usage_records", "machine_name")? {
                    tx.execute_batch(sql)?;
                }
                continue;
            }
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
