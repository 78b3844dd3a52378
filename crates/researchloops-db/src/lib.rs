//! Database layer for researchloops.
//!
//! A single `Database` owns the SQLite connection and hands out stores for
//! evaluation summaries and committed prompt versions.

mod evaluations;
mod versions;

pub use evaluations::{EvaluationFilter, EvaluationRecord, Evaluations};
pub use versions::{VersionRecord, Versions};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at `~/.local/share/researchloops/researchloops.db`.
    pub fn open() -> Result<Self, rusqlite::Error> {
        let db_path = Self::default_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        Self::open_at(&db_path)
    }

    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("researchloops")
            .join("researchloops.db")
    }

    pub fn evaluations(&self) -> Evaluations<'_> {
        Evaluations::new(self.lock())
    }

    pub fn versions(&self) -> Versions<'_> {
        Versions::new(self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                objective TEXT NOT NULL,
                domain TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                overall_score REAL NOT NULL,
                quality_score REAL NOT NULL,
                accuracy REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evaluations_created_at ON evaluations(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_evaluations_domain ON evaluations(domain);

            CREATE TABLE IF NOT EXISTS prompt_versions (
                version INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                parameters TEXT NOT NULL,
                evaluation_score REAL NOT NULL,
                description TEXT NOT NULL
            );
            "#,
        )
    }
}
