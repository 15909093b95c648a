//! SQLite persistence for profiles, tasks, subtasks and revoked tokens.
//!
//! A [`Store`] wraps one rusqlite [`Connection`] behind a mutex and is cheap
//! to clone.  All methods are blocking; async callers go through
//! [`Store::run`], which moves the work onto tokio's blocking pool.
//!
//! ## Tables
//! - `profiles`: one row per account, including the Argon2 password hash.
//! - `tasks`: owned by a profile; deleting a profile deletes its tasks.
//! - `subtasks`: owned by a task; ordered by `position`.
//! - `revoked_tokens`: refresh-token ids invalidated by logout.

mod profiles;
mod tasks;
mod tokens;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

pub use profiles::Credentials;

/// Schema version stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("{0}")]
    Invalid(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(String),
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Private in-memory database.  Used by tests and the `:memory:` config.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version < SCHEMA_VERSION {
            init_schema(&conn)?;
        }

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the store on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            priority TEXT NOT NULL DEFAULT 'medium',
            due_date TEXT,
            total_estimated_time TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS tasks_user ON tasks(user_id, created_at);

        CREATE TABLE IF NOT EXISTS subtasks (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            link TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            estimated_time TEXT,
            depends_on TEXT NOT NULL DEFAULT '[]',
            position INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS subtasks_task ON subtasks(task_id, position);

        CREATE TABLE IF NOT EXISTS revoked_tokens (
            jti TEXT PRIMARY KEY,
            expires_at INTEGER NOT NULL
        );

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn schema_version_set() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.lock().unwrap();
        let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(v, SCHEMA_VERSION);
    }

    #[test]
    fn reopen_file_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bubu.db");
        {
            let store = Store::open(&path).unwrap();
            store.create_profile("Ann", "ann@example.com", "hash").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.credentials_by_email("ann@example.com").unwrap().is_some());
    }

    #[tokio::test]
    async fn run_moves_work_off_the_runtime() {
        let store = Store::open_in_memory().unwrap();
        let profile = store
            .run(|s| s.create_profile("Bo", "bo@example.com", "hash"))
            .await
            .unwrap();
        assert_eq!(profile.name, "Bo");
    }
}
