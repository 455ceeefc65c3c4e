//! Operation store schema and migrations
//!
//! SQLite with embedded migrations tracked via PRAGMA user_version.

use rusqlite::Connection;

use crate::errors::EngineError;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: operations history
    r#"
    CREATE TABLE IF NOT EXISTS operations (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        subject    TEXT NOT NULL,
        kind       TEXT NOT NULL,
        status     TEXT NOT NULL DEFAULT 'RUNNING',
        progress   INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_operations_subject ON operations(subject);
    CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status);
    "#,
];

/// Apply any migrations newer than the database's recorded version.
pub fn run_migrations(conn: &Connection) -> Result<(), EngineError> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let target = idx as i32 + 1;
        if version < target {
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", target)?;
        }
    }

    Ok(())
}
