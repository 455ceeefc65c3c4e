//! Durable operation store
//!
//! The operations table is the single source of truth for what ran and
//! what is running, and the only state that must survive a restart. One
//! runner task owns the writes for a given row; readers are unrestricted.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::errors::EngineError;
use crate::models::{OpStatus, Operation};

/// Store handle. A single connection behind a mutex; WAL mode keeps
/// concurrent readers cheap.
pub struct OperationStore {
    conn: Mutex<Connection>,
}

impl OperationStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        schema::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Default on-disk location.
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join("operations.db")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|e| EngineError::StorageError(format!("store lock poisoned: {e}")))
    }

    /// Create a new operation row in RUNNING state with progress 0 and
    /// return its id.
    pub fn create(&self, subject: &str, kind: &str) -> Result<i64, EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operations (subject, kind, status, progress, created_at)
             VALUES (?1, ?2, 'RUNNING', 0, ?3)",
            params![subject, kind, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Finalize a RUNNING operation with a terminal status and progress.
    /// A row that already reached a terminal state (an explicit stop that
    /// raced the run) is left untouched; returns whether a row changed.
    pub fn finalize(&self, id: i64, status: OpStatus, progress: i64) -> Result<bool, EngineError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE operations SET status = ?1, progress = ?2
             WHERE id = ?3 AND status = 'RUNNING'",
            params![status.as_str(), progress, id],
        )?;
        Ok(updated > 0)
    }

    /// Mark a RUNNING operation as STOPPED. A no-op for rows that already
    /// reached a terminal state; returns whether a row was changed.
    pub fn mark_stopped(&self, id: i64) -> Result<bool, EngineError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE operations SET status = 'STOPPED' WHERE id = ?1 AND status = 'RUNNING'",
            params![id],
        )?;
        Ok(updated > 0)
    }

    /// Current (status, progress) of an operation.
    pub fn status(&self, id: i64) -> Result<Option<(OpStatus, i64)>, EngineError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT status, progress FROM operations WHERE id = ?1",
                params![id],
                |row| {
                    let status: String = row.get(0)?;
                    let progress: i64 = row.get(1)?;
                    Ok((status, progress))
                },
            )
            .optional()?;

        match row {
            Some((status, progress)) => {
                let status = status
                    .parse::<OpStatus>()
                    .map_err(EngineError::StorageError)?;
                Ok(Some((status, progress)))
            }
            None => Ok(None),
        }
    }

    /// Fetch a full operation record.
    pub fn get(&self, id: i64) -> Result<Option<Operation>, EngineError> {
        let conn = self.lock()?;
        let op = conn
            .query_row(
                "SELECT id, subject, kind, status, progress, created_at
                 FROM operations WHERE id = ?1",
                params![id],
                row_to_operation,
            )
            .optional()?;
        Ok(op)
    }

    /// Full operation history, most recent first.
    pub fn history(&self) -> Result<Vec<Operation>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, subject, kind, status, progress, created_at
             FROM operations ORDER BY id DESC",
        )?;
        let ops = stmt
            .query_map([], row_to_operation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ops)
    }

    /// Number of operations still in RUNNING state.
    pub fn running_count(&self) -> Result<i64, EngineError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM operations WHERE status = 'RUNNING'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Bulk history clear. The only way operation rows are ever deleted.
    pub fn clear_history(&self) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM operations", [])?;
        Ok(())
    }
}

fn row_to_operation(row: &Row<'_>) -> rusqlite::Result<Operation> {
    let status: String = row.get(3)?;
    let status = status.parse::<OpStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;

    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Operation {
        id: row.get(0)?,
        subject: row.get(1)?,
        kind: row.get(2)?,
        status,
        progress: row.get(4)?,
        created_at,
    })
}
