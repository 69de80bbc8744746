//! The SQLite-backed row store.
//!
//! One table (`mcc`), one index (on the expiry column), and a fixed set of
//! statements. Every mutation runs inside an explicit transaction so a crash
//! mid-write cannot corrupt the table. The engine itself is not thread-safe;
//! the owning node serializes all access through its mutex.

use crate::config::{CorruptionPolicy, StoreConfig};
use crate::error::{StoreError, StoreResult};
use protocol_mesh::{auth, Command, Row};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const SQL_TABLE_EXISTS: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'mcc'";
const SQL_CREATE_TABLE: &str = "CREATE TABLE mcc (\
     k BLOB PRIMARY KEY, \
     d BLOB, \
     h INTEGER DEFAULT 1, \
     c INTEGER, \
     t INTEGER, \
     e INTEGER)";
const SQL_INDEX_EXISTS: &str =
    "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'mcc_expires'";
const SQL_CREATE_INDEX: &str = "CREATE INDEX mcc_expires ON mcc (e)";

const SQL_SELECT_ONE: &str = "SELECT d, h, c, t, e FROM mcc WHERE k = ?1";
const SQL_REPLACE: &str =
    "INSERT OR REPLACE INTO mcc (k, d, h, c, t, e) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const SQL_DELETE_ONE: &str = "DELETE FROM mcc WHERE k = ?1";
const SQL_DELETE_EXPIRED: &str = "DELETE FROM mcc WHERE e <= ?1";
const SQL_DELETE_ALL: &str = "DELETE FROM mcc";

const SQL_BEGIN: &str = "BEGIN";
const SQL_COMMIT: &str = "COMMIT";
const SQL_ROLLBACK: &str = "ROLLBACK";

/// The durable row store backing one cache node.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (and if necessary bootstrap) the store, applying the configured
    /// corruption policy when the file is damaged.
    ///
    /// With [`CorruptionPolicy::Exit`] a damaged file terminates the
    /// process; the other policies move the file aside or delete it and
    /// retry once with a fresh database.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        match Self::try_open(config) {
            Err(StoreError::Corrupt(reason)) => Self::recover(config, &reason),
            other => other,
        }
    }

    fn recover(config: &StoreConfig, reason: &str) -> StoreResult<Self> {
        match config.corruption {
            CorruptionPolicy::Exit => {
                error!(
                    path = %config.path.display(),
                    reason,
                    "cache store corrupt, exiting per policy"
                );
                std::process::exit(1);
            }
            CorruptionPolicy::Rename => {
                let aside = rename_aside(&config.path)
                    .map_err(|e| StoreError::Open(e.to_string()))?;
                warn!(
                    path = %config.path.display(),
                    saved = %aside.display(),
                    reason,
                    "cache store corrupt, damaged file moved aside"
                );
                Self::try_open(config)
            }
            CorruptionPolicy::Replace => {
                std::fs::remove_file(&config.path)
                    .map_err(|e| StoreError::Open(e.to_string()))?;
                warn!(
                    path = %config.path.display(),
                    reason,
                    "cache store corrupt, damaged file replaced"
                );
                Self::try_open(config)
            }
        }
    }

    fn try_open(config: &StoreConfig) -> StoreResult<Self> {
        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        let conn = Connection::open_with_flags(&config.path, flags)
            .map_err(|e| StoreError::Open(e.to_string()))?;

        // A garbage file opens fine; it fails here instead.
        let verdict: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| {
                if is_corruption(&e) {
                    StoreError::Corrupt(e.to_string())
                } else {
                    StoreError::Open(e.to_string())
                }
            })?;
        if verdict != "ok" {
            return Err(StoreError::Corrupt(verdict));
        }

        conn.execute_batch(config.sync.pragma())
            .map_err(|e| StoreError::Open(e.to_string()))?;

        let store = Store {
            conn,
            path: config.path.clone(),
        };
        if !config.read_only {
            store.bootstrap()?;
        }
        debug!(path = %store.path.display(), "cache store open");
        Ok(store)
    }

    fn bootstrap(&self) -> StoreResult<()> {
        let table: Option<String> = self
            .conn
            .query_row(SQL_TABLE_EXISTS, [], |row| row.get(0))
            .optional()
            .map_err(query_err)?;
        if table.is_none() {
            self.conn.execute(SQL_CREATE_TABLE, []).map_err(query_err)?;
        }

        let index: Option<String> = self
            .conn
            .query_row(SQL_INDEX_EXISTS, [], |row| row.get(0))
            .optional()
            .map_err(query_err)?;
        if index.is_none() {
            self.conn.execute(SQL_CREATE_INDEX, []).map_err(query_err)?;
        }
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point lookup by key. The returned row's digest is the content
    /// fingerprint of the stored value.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Row>> {
        let mut stmt = self.conn.prepare_cached(SQL_SELECT_ONE).map_err(query_err)?;
        let found = stmt
            .query_row(params![key], |r| {
                Ok((
                    r.get::<_, Vec<u8>>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, i64>(4)?,
                ))
            })
            .optional()
            .map_err(query_err)?;

        Ok(found.map(|(value, hits, created, touched, expires)| Row {
            digest: auth::content_digest(&value),
            created: created as u32,
            touched: touched as u32,
            expires: expires as u32,
            hits: hits as u32,
            command: Command::Put,
            key: key.to_vec(),
            value,
        }))
    }

    /// Insert or replace a row, transactionally.
    pub fn put(&self, row: &Row) -> StoreResult<()> {
        self.in_tx(|conn| {
            let mut stmt = conn.prepare_cached(SQL_REPLACE)?;
            stmt.execute(params![
                row.key,
                row.value,
                row.hits as i64,
                row.created as i64,
                row.touched as i64,
                row.expires as i64,
            ])?;
            Ok(())
        })
    }

    /// Delete a row by key, transactionally. Returns whether a row existed.
    pub fn delete(&self, key: &[u8]) -> StoreResult<bool> {
        self.in_tx(|conn| {
            let mut stmt = conn.prepare_cached(SQL_DELETE_ONE)?;
            Ok(stmt.execute(params![key])? > 0)
        })
    }

    /// Delete every row whose expiry is at or before `cutoff`. Returns the
    /// number of rows removed. A single indexed range delete.
    pub fn expire_before(&self, cutoff: u32) -> StoreResult<usize> {
        self.in_tx(|conn| {
            let mut stmt = conn.prepare_cached(SQL_DELETE_EXPIRED)?;
            stmt.execute(params![cutoff as i64])
        })
    }

    /// Delete every row.
    pub fn truncate(&self) -> StoreResult<()> {
        self.in_tx(|conn| {
            conn.execute(SQL_DELETE_ALL, [])?;
            Ok(())
        })
    }

    /// Start an explicit transaction.
    pub fn begin(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(SQL_BEGIN)
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    /// Commit the open transaction.
    pub fn commit(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(SQL_COMMIT)
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    /// Roll back the open transaction.
    pub fn rollback(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(SQL_ROLLBACK)
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }

    fn in_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        // Inside a caller-managed BEGIN, the caller owns commit/rollback.
        if !self.conn.is_autocommit() {
            return f(&self.conn).map_err(query_err);
        }
        self.begin()?;
        match f(&self.conn) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.rollback() {
                    warn!(error = %rb, "rollback failed after query error");
                }
                Err(query_err(e))
            }
        }
    }
}

fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn is_corruption(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::NotADatabase
                || f.code == rusqlite::ErrorCode::DatabaseCorrupt
    )
}

/// Move a damaged database file aside, picking the first unused
/// `<path>.corrupt[.N]` name.
fn rename_aside(path: &Path) -> std::io::Result<PathBuf> {
    let base = path.as_os_str().to_os_string();
    for n in 0u32.. {
        let mut candidate = base.clone();
        if n == 0 {
            candidate.push(".corrupt");
        } else {
            candidate.push(format!(".corrupt.{}", n));
        }
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            std::fs::rename(path, &candidate)?;
            return Ok(candidate);
        }
    }
    unreachable!("ran out of rename candidates");
}
