//! Device-local history store for the guest identity.
//!
//! One durable slot per persona id, backed by a single SQLite database at
//! `{root_dir}/buddy.db`. Each slot holds the full serialized message
//! sequence for that persona and is overwritten wholesale on every user
//! send and every completed assistant reply (at-least-once,
//! last-write-wins).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{BuddyError, Result};
use crate::model::Message;

/// Database filename within the data root directory.
const DB_FILENAME: &str = "buddy.db";

/// Current schema version stamp.
const SCHEMA_VERSION: u32 = 1;

/// SQLite-backed guest history store.
///
/// Thread-safe via an internal `Mutex<Connection>`; slot writes are
/// serialized.
pub struct LocalHistory {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl LocalHistory {
    /// Open (or create) the database at `{root_dir}/buddy.db`, applying
    /// the schema if new.
    pub fn open(root_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(root_dir)?;
        let db_path = root_dir.join(DB_FILENAME);
        let conn = Connection::open(&db_path)
            .map_err(|e| BuddyError::Persistence(format!("open {}: {e}", db_path.display())))?;
        apply_schema(&conn)?;
        Ok(Self {
            root: root_dir.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// Returns the data root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the current schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Load the message sequence stored in a persona's slot.
    ///
    /// An absent slot is an empty timeline, not an error.
    pub fn load(&self, persona_id: i64) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM guest_history WHERE persona_id = ?1",
                params![persona_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err)?;

        match payload {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| BuddyError::Persistence(format!("corrupt slot {persona_id}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite a persona's slot with the full current timeline.
    ///
    /// In-flight (streaming) messages are never persisted.
    pub fn replace(&self, persona_id: i64, timeline: &[Message]) -> Result<()> {
        let settled: Vec<&Message> = timeline.iter().filter(|m| !m.streaming).collect();
        let json = serde_json::to_string(&settled)
            .map_err(|e| BuddyError::Persistence(format!("serialize slot: {e}")))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO guest_history (persona_id, payload, updated_at) \
             VALUES (?1, ?2, strftime('%s','now')) \
             ON CONFLICT(persona_id) DO UPDATE SET \
             payload = excluded.payload, updated_at = excluded.updated_at",
            params![persona_id, json],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Delete a persona's slot.
    pub fn clear(&self, persona_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM guest_history WHERE persona_id = ?1",
            params![persona_id],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BuddyError::Persistence("history store lock poisoned".to_owned()))
    }
}

/// Idempotent schema application.
fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (\
             key TEXT PRIMARY KEY, \
             value TEXT NOT NULL\
         );\
         CREATE TABLE IF NOT EXISTS guest_history (\
             persona_id INTEGER PRIMARY KEY, \
             payload TEXT NOT NULL, \
             updated_at INTEGER NOT NULL\
         );",
    )
    .map_err(sql_err)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )
    .map_err(sql_err)?;
    Ok(())
}

fn sql_err(e: rusqlite::Error) -> BuddyError {
    BuddyError::Persistence(e.to_string())
}
