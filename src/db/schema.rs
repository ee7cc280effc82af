use std::path::Path;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use super::error::{StoreError, StoreResult};
use crate::search::filter::is_internal_command;

/// Handle to the command store. Owns one SQLite connection for the lifetime of
/// a unit of work; dropping it closes the connection.
pub struct Store {
    pub(super) conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        register_functions(&conn)?;
        initialize_db(&conn)?;
        Ok(Self { conn })
    }
}

fn register_functions(conn: &Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        "repty_internal",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let command: String = ctx.get(0)?;
            Ok(is_internal_command(&command))
        },
    )?;
    Ok(())
}

pub fn initialize_db(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS commands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            command TEXT NOT NULL,
            cwd TEXT,
            timestamp INTEGER NOT NULL,
            exit_code INTEGER,
            tags TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_commands_timestamp ON commands(timestamp);
        CREATE INDEX IF NOT EXISTS idx_commands_command ON commands(command);
        ",
    )?;

    if let Err(e) = conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS commands_fts USING fts5(
            command, tags,
            content='commands', content_rowid='id'
        );",
    ) {
        if e.to_string().to_lowercase().contains("fts5") {
            return Err(StoreError::Fts5Unavailable);
        }
        return Err(e.into());
    }

    // External-content FTS tables must be told the old values on delete.
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS commands_ai AFTER INSERT ON commands BEGIN
            INSERT INTO commands_fts(rowid, command, tags)
            VALUES (new.id, new.command, new.tags);
        END;

        CREATE TRIGGER IF NOT EXISTS commands_ad AFTER DELETE ON commands BEGIN
            INSERT INTO commands_fts(commands_fts, rowid, command, tags)
            VALUES ('delete', old.id, old.command, old.tags);
        END;

        CREATE TRIGGER IF NOT EXISTS commands_au AFTER UPDATE ON commands BEGIN
            INSERT INTO commands_fts(commands_fts, rowid, command, tags)
            VALUES ('delete', old.id, old.command, old.tags);
            INSERT INTO commands_fts(rowid, command, tags)
            VALUES (new.id, new.command, new.tags);
        END;
        ",
    )?;

    Ok(())
}
