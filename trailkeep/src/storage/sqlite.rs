//! SQLite primary backend.
//!
//! One table per collection, values stored as MessagePack blobs with an
//! indexed sort key. The schema is versioned with `rusqlite_migration`.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};
use serde_json::Value;

use super::{BackendKind, Collection, Record, StorageBackend};
use crate::error::{StoreError, StoreResult};

/// Schema history. Append new steps; never edit applied ones.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        -- Finalized routes (newest first by creation time)
        CREATE TABLE routes (
            key TEXT PRIMARY KEY,
            sort_key INTEGER NOT NULL DEFAULT 0,
            data BLOB NOT NULL
        );
        CREATE INDEX idx_routes_sort_key ON routes(sort_key);

        -- Single-slot crash-recovery snapshot
        CREATE TABLE backups (
            key TEXT PRIMARY KEY,
            sort_key INTEGER NOT NULL DEFAULT 0,
            data BLOB NOT NULL
        );

        -- Preferences and markers
        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            sort_key INTEGER NOT NULL DEFAULT 0,
            data BLOB NOT NULL
        );
        "#,
    )])
}

/// Structured transactional backend.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &str) -> StoreResult<Self> {
        Self::open_with_limit(db_path, None)
    }

    /// Open with an optional cap on the database size in pages.
    ///
    /// Writes that would grow the file beyond the cap fail with
    /// `SQLITE_FULL`, which the store treats as a quota error.
    pub fn open_with_limit(db_path: &str, max_page_count: Option<u32>) -> StoreResult<Self> {
        let mut conn = Connection::open(db_path)?;
        migrations().to_latest(&mut conn)?;

        if let Some(pages) = max_page_count {
            let applied: i64 = conn.pragma_update_and_check(
                None,
                "max_page_count",
                pages,
                |row| row.get(0),
            )?;
            log::info!(
                "[SqliteBackend] max_page_count set to {} (requested {})",
                applied,
                pages
            );
        }

        log::info!("[SqliteBackend] Opened {}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Background("SQLite connection lock poisoned".to_string()))
    }
}

/// Map `SQLITE_FULL` to a quota error; pass everything else through.
fn classify(err: rusqlite::Error) -> StoreError {
    let err = StoreError::Sqlite(err);
    if err.is_quota() {
        StoreError::QuotaExceeded {
            backend: BackendKind::Sqlite,
        }
    } else {
        err
    }
}

fn decode_row(key: String, sort_key: i64, blob: &[u8]) -> StoreResult<Record> {
    let value: Value = rmp_serde::from_slice(blob)?;
    Ok(Record {
        key,
        sort_key,
        value,
    })
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn put(&self, collection: Collection, record: &Record) -> StoreResult<()> {
        let blob = rmp_serde::to_vec(&record.value)?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, sort_key, data) VALUES (?, ?, ?)",
                collection.name()
            ),
            params![record.key, record.sort_key, blob],
        )
        .map_err(classify)?;
        Ok(())
    }

    fn put_all(&self, collection: Collection, records: &[Record]) -> StoreResult<()> {
        let blobs = records
            .iter()
            .map(|r| rmp_serde::to_vec(&r.value))
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {} (key, sort_key, data) VALUES (?, ?, ?)",
                collection.name()
            ))?;
            for (record, blob) in records.iter().zip(&blobs) {
                stmt.execute(params![record.key, record.sort_key, blob])
                    .map_err(classify)?;
            }
        }
        tx.commit().map_err(classify)?;
        Ok(())
    }

    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT key, sort_key, data FROM {} WHERE key = ?",
            collection.name()
        ))?;
        let mut rows = stmt.query(params![key])?;

        match rows.next()? {
            Some(row) => {
                let blob: Vec<u8> = row.get(2)?;
                decode_row(row.get(0)?, row.get(1)?, &blob).map(Some)
            }
            None => Ok(None),
        }
    }

    fn get_all(&self, collection: Collection) -> StoreResult<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT key, sort_key, data FROM {} ORDER BY sort_key DESC, key DESC",
            collection.name()
        ))?;

        let records = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(key, sort_key, blob)| match decode_row(key.clone(), sort_key, &blob) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!(
                        "[SqliteBackend] Skipping undecodable {} record '{}': {}",
                        collection.name(),
                        key,
                        e
                    );
                    None
                }
            })
            .collect();

        Ok(records)
    }

    fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?", collection.name()),
            params![key],
        )?;
        Ok(())
    }

    fn clear(&self, collection: Collection) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", collection.name()), [])?;
        Ok(())
    }
}
