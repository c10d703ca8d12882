use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use taskling_common::{Error, Result};
use tracing::info;

/// A conversation session as persisted between turns. History is the raw
/// message array in provider wire shape; the agent crate owns its meaning.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub history: serde_json::Value,
    pub plan: Option<Vec<String>>,
    pub plan_step: usize,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            history: serde_json::Value::Array(Vec::new()),
            plan: None,
            plan_step: 0,
        }
    }
}

/// Persistent storage for conversation sessions.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening session store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
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
                "CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    history TEXT NOT NULL,
                    plan TEXT,
                    plan_step INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Fetch a session, or None if this is its first turn.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row: Option<(String, String, Option<String>, i64)> = self
            .conn
            .query_row(
                "SELECT user_id, history, plan, plan_step FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load session: {e}")))?;

        let Some((user_id, history_raw, plan_raw, plan_step)) = row else {
            return Ok(None);
        };

        let history: serde_json::Value = serde_json::from_str(&history_raw)
            .map_err(|e| Error::Database(format!("corrupt session history: {e}")))?;
        let plan = match plan_raw {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| Error::Database(format!("corrupt session plan: {e}")))?,
            ),
            None => None,
        };

        Ok(Some(SessionRecord {
            session_id: session_id.to_string(),
            user_id,
            history,
            plan,
            plan_step: plan_step.max(0) as usize,
        }))
    }

    /// Upsert the whole session state in one write.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let history = serde_json::to_string(&record.history)
            .map_err(|e| Error::Database(format!("failed to serialize history: {e}")))?;
        let plan = match &record.plan {
            Some(steps) => Some(
                serde_json::to_string(steps)
                    .map_err(|e| Error::Database(format!("failed to serialize plan: {e}")))?,
            ),
            None => None,
        };

        self.conn
            .execute(
                "INSERT INTO sessions (id, user_id, history, plan, plan_step)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     history = excluded.history,
                     plan = excluded.plan,
                     plan_step = excluded.plan_step,
                     updated_at = datetime('now')",
                params![
                    record.session_id,
                    record.user_id,
                    history,
                    plan,
                    record.plan_step as i64
                ],
            )
            .map_err(|e| Error::Database(format!("failed to save session: {e}")))?;
        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .map_err(|e| Error::Database(format!("failed to delete session: {e}")))?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionRecord, SessionStore};
    use serde_json::json;

    #[test]
    fn load_missing_session_is_none() {
        let store = SessionStore::in_memory().expect("in-memory store should open");
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trips() {
        let store = SessionStore::in_memory().expect("in-memory store should open");

        let mut record = SessionRecord::new("s1", "u1");
        record.history = json!([
            {"role": "user", "content": "remind me to stretch"},
            {"role": "assistant", "content": "Done!"}
        ]);
        record.plan = Some(vec!["add the task".to_string(), "confirm".to_string()]);
        record.plan_step = 1;
        store.save(&record).expect("save should succeed");

        let loaded = store.load("s1").unwrap().expect("session exists");
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.history, record.history);
        assert_eq!(loaded.plan.as_deref(), Some(&["add the task".to_string(), "confirm".to_string()][..]));
        assert_eq!(loaded.plan_step, 1);
    }

    #[test]
    fn save_twice_overwrites() {
        let store = SessionStore::in_memory().expect("in-memory store should open");

        let mut record = SessionRecord::new("s1", "u1");
        store.save(&record).unwrap();

        record.history = json!([{"role": "user", "content": "hi"}]);
        record.plan = None;
        record.plan_step = 0;
        store.save(&record).unwrap();

        let loaded = store.load("s1").unwrap().expect("session exists");
        assert_eq!(loaded.history.as_array().map(Vec::len), Some(1));
        assert!(loaded.plan.is_none());
    }

    #[test]
    fn new_record_starts_empty() {
        let record = SessionRecord::new("s1", "u1");
        assert_eq!(record.history, json!([]));
        assert!(record.plan.is_none());
        assert_eq!(record.plan_step, 0);
    }

    #[test]
    fn delete_session() {
        let store = SessionStore::in_memory().expect("in-memory store should open");
        store.save(&SessionRecord::new("s1", "u1")).unwrap();

        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
        assert!(store.load("s1").unwrap().is_none());
    }
}
