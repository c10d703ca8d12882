use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use taskling_common::{Error, Result};
use tracing::{info, warn};

/// One to-do item as stored.
#[derive(Debug, Clone)]
pub struct Task {
    /// Per-user sequential number. Stable: never reused, not even after
    /// the list is cleared.
    pub number: i64,
    pub description: String,
    pub done: bool,
    pub due_at: Option<chrono::DateTime<chrono::Utc>>,
    pub event_ref: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Result of marking a task done. Re-completing an already-done task is
/// not an error; the caller still gets a confirmation to hand back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed(String),
    AlreadyDone(String),
    NotFound,
}

/// Persistent storage for to-do items, keyed by `(user_id, number)`.
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening task store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS tasks (
                    user_id TEXT NOT NULL,
                    number INTEGER NOT NULL,
                    description TEXT NOT NULL,
                    done INTEGER NOT NULL DEFAULT 0,
                    due_at TEXT,
                    event_ref TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (user_id, number)
                );

                CREATE TABLE IF NOT EXISTS task_counters (
                    user_id TEXT PRIMARY KEY,
                    next_number INTEGER NOT NULL
                );",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Insert a task and return its assigned number. Numbers come from a
    /// per-user counter that only ever moves forward, so a number stays a
    /// valid referent for the whole life of the user even after clears.
    pub fn insert_task(
        &self,
        user_id: &str,
        description: &str,
        due_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<i64> {
        let number: i64 = self
            .conn
            .query_row(
                "INSERT INTO task_counters (user_id, next_number) VALUES (?1, 1)
                 ON CONFLICT(user_id) DO UPDATE SET next_number = next_number + 1
                 RETURNING next_number",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to assign task number: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO tasks (user_id, number, description, due_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    number,
                    description,
                    due_at.map(|dt| dt.to_rfc3339())
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert task: {e}")))?;

        Ok(number)
    }

    /// All tasks for a user in creation order.
    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT number, description, done, due_at, event_ref, created_at
                 FROM tasks
                 WHERE user_id = ?1
                 ORDER BY number",
            )
            .map_err(|e| Error::Database(format!("failed to prepare task query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let due_raw: Option<String> = row.get(3)?;
                let created_raw: String = row.get(5)?;
                Ok(Task {
                    number: row.get(0)?,
                    description: row.get(1)?,
                    done: row.get::<_, i64>(2)? != 0,
                    due_at: due_raw.as_deref().map(parse_timestamp),
                    event_ref: row.get(4)?,
                    created_at: parse_sqlite_timestamp(&created_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to list tasks: {e}")))?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(|e| Error::Database(format!("failed to read task row: {e}")))?);
        }
        Ok(tasks)
    }

    /// Mark a task done. Idempotent-safe: an already-done task stays done
    /// and is reported as such rather than silently ignored.
    pub fn set_done(&self, user_id: &str, number: i64) -> Result<CompleteOutcome> {
        let current: Option<(String, bool)> = self
            .conn
            .query_row(
                "SELECT description, done FROM tasks WHERE user_id = ?1 AND number = ?2",
                params![user_id, number],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read task: {e}")))?;

        let Some((description, done)) = current else {
            return Ok(CompleteOutcome::NotFound);
        };
        if done {
            return Ok(CompleteOutcome::AlreadyDone(description));
        }

        self.conn
            .execute(
                "UPDATE tasks SET done = 1 WHERE user_id = ?1 AND number = ?2",
                params![user_id, number],
            )
            .map_err(|e| Error::Database(format!("failed to mark task done: {e}")))?;

        Ok(CompleteOutcome::Completed(description))
    }

    /// Delete every task for a user and return the count. The number
    /// counter is deliberately left untouched.
    pub fn delete_all(&self, user_id: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE user_id = ?1", params![user_id])
            .map_err(|e| Error::Database(format!("failed to clear tasks: {e}")))?;
        Ok(deleted)
    }

    /// Attach a calendar event reference to a task after the event was
    /// created. Returns false if the task no longer exists.
    pub fn update_event_ref(&self, user_id: &str, number: i64, event_ref: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE tasks SET event_ref = ?1 WHERE user_id = ?2 AND number = ?3",
                params![event_ref, user_id, number],
            )
            .map_err(|e| Error::Database(format!("failed to set event ref: {e}")))?;
        Ok(rows > 0)
    }

    pub fn find_task(&self, user_id: &str, number: i64) -> Result<Option<Task>> {
        self.conn
            .query_row(
                "SELECT number, description, done, due_at, event_ref, created_at
                 FROM tasks WHERE user_id = ?1 AND number = ?2",
                params![user_id, number],
                |row| {
                    let due_raw: Option<String> = row.get(3)?;
                    let created_raw: String = row.get(5)?;
                    Ok(Task {
                        number: row.get(0)?,
                        description: row.get(1)?,
                        done: row.get::<_, i64>(2)? != 0,
                        due_at: due_raw.as_deref().map(parse_timestamp),
                        event_ref: row.get(4)?,
                        created_at: parse_sqlite_timestamp(&created_raw),
                    })
                },
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to find task: {e}")))
    }
}

fn parse_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|e| {
            warn!("failed to parse timestamp '{value}': {e}, falling back to now");
            chrono::Utc::now()
        })
}

/// `datetime('now')` emits "YYYY-MM-DD HH:MM:SS" rather than RFC 3339.
fn parse_sqlite_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| parse_timestamp(value))
}
