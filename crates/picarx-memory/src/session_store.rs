//! Per-session plan persistence.
//!
//! The plan store only needs `load` and `save` keyed by session identifier;
//! everything else about the backend is opaque.  Two backends are provided:
//! [`InMemorySessionStore`] for tests and throwaway runs, and
//! [`SqliteSessionStore`] for plans that survive a restart.
//!
//! # Storage layout
//!
//! [`SqliteSessionStore`] creates one table `session_plans`:
//!
//! | column      | type | description                                |
//! |-------------|------|--------------------------------------------|
//! | session_id  | TEXT | Session identifier, primary key            |
//! | plan_json   | TEXT | The serialized [`Plan`] including history  |
//! | status      | TEXT | Plan status, duplicated for inspection     |
//! | updated_at  | TEXT | RFC-3339 last-save timestamp (UTC)         |
//!
//! # Example
//!
//! ```rust
//! use picarx_memory::session_store::{SessionStore, SqliteSessionStore};
//! use picarx_types::{Plan, SessionId};
//!
//! let store = SqliteSessionStore::open_in_memory().unwrap();
//! let session = SessionId::new("kitchen");
//!
//! let plan = Plan::new("find the exit", vec!["look around".into()]).unwrap();
//! store.save(&session, &plan).unwrap();
//!
//! let loaded = store.load(&session).unwrap().unwrap();
//! assert_eq!(loaded.task, "find the exit");
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use picarx_types::{PicarError, Plan, SessionId};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Plan encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<SessionStoreError> for PicarError {
    fn from(e: SessionStoreError) -> Self {
        PicarError::Storage(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionStore trait
// ─────────────────────────────────────────────────────────────────────────────

/// Key-value persistence of one [`Plan`] per session.
pub trait SessionStore: Send + Sync {
    fn load(&self, session: &SessionId) -> Result<Option<Plan>, SessionStoreError>;

    /// Insert or replace the plan stored for `session`.
    fn save(&self, session: &SessionId, plan: &Plan) -> Result<(), SessionStoreError>;

    /// Forget the plan stored for `session`.  Missing sessions are not an
    /// error.
    fn remove(&self, session: &SessionId) -> Result<(), SessionStoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemorySessionStore {
    plans: Mutex<HashMap<SessionId, Plan>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn plans(&self) -> MutexGuard<'_, HashMap<SessionId, Plan>> {
        self.plans.lock().unwrap_or_else(|poisoned| {
            warn!("in-memory session store poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session: &SessionId) -> Result<Option<Plan>, SessionStoreError> {
        Ok(self.plans().get(session).cloned())
    }

    fn save(&self, session: &SessionId, plan: &Plan) -> Result<(), SessionStoreError> {
        self.plans().insert(session.clone(), plan.clone());
        Ok(())
    }

    fn remove(&self, session: &SessionId) -> Result<(), SessionStoreError> {
        self.plans().remove(session);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite backend
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed session store.
///
/// `rusqlite::Connection` is not `Sync`, so the connection sits behind a
/// mutex; every call is one short statement.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: &str) -> Result<Self, SessionStoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, SessionStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("session store connection mutex poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn init_schema(&self) -> Result<(), SessionStoreError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS session_plans (
                session_id  TEXT NOT NULL PRIMARY KEY,
                plan_json   TEXT NOT NULL,
                status      TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, session: &SessionId) -> Result<Option<Plan>, SessionStoreError> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT plan_json FROM session_plans WHERE session_id = ?1",
                params![session.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, session: &SessionId, plan: &Plan) -> Result<(), SessionStoreError> {
        let json = serde_json::to_string(plan)?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO session_plans (session_id, plan_json, status, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                plan_json = excluded.plan_json,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![session.as_str(), json, plan.status.as_str(), now],
        )?;
        debug!(session = %session, status = plan.status.as_str(), "plan saved");
        Ok(())
    }

    fn remove(&self, session: &SessionId) -> Result<(), SessionStoreError> {
        self.conn().execute(
            "DELETE FROM session_plans WHERE session_id = ?1",
            params![session.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use picarx_types::PlanStatus;
    use tempfile::tempdir;

    use super::*;

    fn sample_plan() -> Plan {
        Plan::new(
            "Explore the room",
            vec!["Take initial photo".into(), "Scan the room".into()],
        )
        .unwrap()
    }

    #[test]
    fn in_memory_round_trip_and_remove() {
        let store = InMemorySessionStore::new();
        let session = SessionId::new("s1");
        assert!(store.load(&session).unwrap().is_none());
        store.save(&session, &sample_plan()).unwrap();
        assert!(store.load(&session).unwrap().is_some());
        store.remove(&session).unwrap();
        assert!(store.load(&session).unwrap().is_none());
    }

    #[test]
    fn sqlite_save_overwrites_same_session() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        let session = SessionId::new("s1");
        let mut plan = sample_plan();
        store.save(&session, &plan).unwrap();

        plan.advance("Take initial photo", true).unwrap();
        store.save(&session, &plan).unwrap();

        let loaded = store.load(&session).unwrap().unwrap();
        assert_eq!(loaded.current_step, 1);
        assert_eq!(loaded.status, PlanStatus::InProgress);
        assert_eq!(loaded.history.len(), 1);
    }

    #[test]
    fn sqlite_sessions_are_isolated() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        store.save(&SessionId::new("a"), &sample_plan()).unwrap();
        assert!(store.load(&SessionId::new("b")).unwrap().is_none());
        store.remove(&SessionId::new("b")).unwrap();
        assert!(store.load(&SessionId::new("a")).unwrap().is_some());
    }

    #[test]
    fn sqlite_file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let path = path.to_str().unwrap();
        let plan = sample_plan();
        {
            let store = SqliteSessionStore::open(path).unwrap();
            store.save(&SessionId::new("persist"), &plan).unwrap();
        }
        let store = SqliteSessionStore::open(path).unwrap();
        let loaded = store.load(&SessionId::new("persist")).unwrap().unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn corrupt_row_is_an_encoding_error() {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO session_plans VALUES ('bad', 'not json', 'pending', 'now')",
                [],
            )
            .unwrap();
        let err = store.load(&SessionId::new("bad")).unwrap_err();
        assert!(matches!(err, SessionStoreError::Encoding(_)));
        assert!(matches!(PicarError::from(err), PicarError::Storage(_)));
    }
}
