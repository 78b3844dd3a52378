//! Committed prompt versions.
//!
//! The table mirrors an in-memory version history: callers replace its
//! contents after commits, trims and rollbacks.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

const COLUMNS: &str = "version, created_at, parameters, evaluation_score, description";

/// Field names match the serialized form of a tuned prompt version, so the
/// two convert through `serde_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    /// JSON object of parameter name to value
    pub parameters: serde_json::Value,
    pub evaluation_score: f64,
    pub description: String,
}

pub struct Versions<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Versions<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Insert or overwrite one version.
    pub fn save(&self, record: &VersionRecord) -> Result<(), rusqlite::Error> {
        Self::upsert(&self.conn, record)
    }

    /// Make the table hold exactly `records`.
    pub fn replace_all(&mut self, records: &[VersionRecord]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM prompt_versions", [])?;
        for record in records {
            Self::upsert(&tx, record)?;
        }
        tx.commit()
    }

    /// Ascending by version number
    pub fn list(&self) -> Result<Vec<VersionRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM prompt_versions ORDER BY version ASC",
            COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn get(&self, version: u64) -> Result<Option<VersionRecord>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM prompt_versions WHERE version = ?1", COLUMNS),
                params![version as i64],
                Self::row_to_record,
            )
            .optional()
    }

    /// Remove every version newer than `version`, returning how many went.
    pub fn delete_after(&self, version: u64) -> Result<usize, rusqlite::Error> {
        self.conn.execute(
            "DELETE FROM prompt_versions WHERE version > ?1",
            params![version as i64],
        )
    }

    fn upsert(conn: &Connection, record: &VersionRecord) -> Result<(), rusqlite::Error> {
        conn.execute(
            r#"
            INSERT INTO prompt_versions (version, created_at, parameters, evaluation_score, description)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(version) DO UPDATE SET
                created_at = excluded.created_at,
                parameters = excluded.parameters,
                evaluation_score = excluded.evaluation_score,
                description = excluded.description
            "#,
            params![
                record.version as i64,
                record.created_at.to_rfc3339(),
                record.parameters.to_string(),
                record.evaluation_score,
                record.description,
            ],
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<VersionRecord, rusqlite::Error> {
        let version: i64 = row.get(0)?;
        let created_at: String = row.get(1)?;
        let parameters: String = row.get(2)?;
        let parameters = serde_json::from_str(&parameters)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        Ok(VersionRecord {
            version: version.max(0) as u64,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            parameters,
            evaluation_score: row.get(3)?,
            description: row.get(4)?,
        })
    }
}
