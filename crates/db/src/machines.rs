use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::migrations::REGISTRY_MIGRATION_0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub machine_name: String,
    pub hostname: String,
    pub registered_date: String,
    pub last_seen: String,
    pub active: bool,
}

/// Registry of every machine whose data has landed on this device.
pub struct MachineRegistry {
    conn: Connection,
}

impl MachineRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "busy_timeout", 30_000)?;
        conn.execute_batch(REGISTRY_MIGRATION_0001)?;
        Ok(Self { conn })
    }

    /// Inserts the machine or refreshes `last_seen` if it is already known.
    pub fn register_machine(&self, machine_name: &str, hostname: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT registered_date FROM machines WHERE machine_name = ?1",
                params![machine_name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            self.conn.execute(
                "UPDATE machines SET last_seen = ?1, hostname = ?2 WHERE machine_name = ?3",
                params![now, hostname, machine_name],
            )?;
        } else {
            self.conn.execute(
                r#"
                INSERT INTO machines (machine_name, hostname, registered_date, last_seen, active)
                VALUES (?1, ?2, ?3, ?4, 1)
                "#,
                params![machine_name, hostname, now, now],
            )?;
        }
        Ok(())
    }

    pub fn list_machines(&self, include_inactive: bool) -> Result<Vec<MachineInfo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT machine_name, hostname, registered_date, last_seen, active
            FROM machines
            WHERE (?1 = 1 OR active = 1)
            ORDER BY last_seen DESC, machine_name ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![include_inactive as i64], |row| {
                Ok(MachineInfo {
                    machine_name: row.get(0)?,
                    hostname: row.get(1)?,
                    registered_date: row.get(2)?,
                    last_seen: row.get(3)?,
                    active: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_active(&self, machine_name: &str, active: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE machines SET active = ?1 WHERE machine_name = ?2",
            params![active as i64, machine_name],
        )?;
        Ok(())
    }
}
