//! Evaluation summaries, used as score history for feedback analysis.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

const COLUMNS: &str =
    "task_id, objective, domain, difficulty, overall_score, quality_score, accuracy, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub task_id: String,
    pub objective: String,
    pub domain: String,
    pub difficulty: String,
    pub overall_score: f64,
    pub quality_score: f64,
    pub accuracy: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct EvaluationFilter {
    pub domain: Option<String>,
    pub limit: Option<usize>,
}

pub struct Evaluations<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Evaluations<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    pub fn save(&self, record: &EvaluationRecord) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "INSERT INTO evaluations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                COLUMNS
            ),
            params![
                record.task_id,
                record.objective,
                record.domain,
                record.difficulty,
                record.overall_score,
                record.quality_score,
                record.accuracy,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Newest first
    pub fn list(&self, filter: &EvaluationFilter) -> Result<Vec<EvaluationRecord>, rusqlite::Error> {
        let mut sql = format!("SELECT {} FROM evaluations WHERE 1=1", COLUMNS);
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref domain) = filter.domain {
            sql.push_str(" AND domain = ?");
            param_values.push(Box::new(domain.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// The `limit` most recent summaries, oldest first
    pub fn recent(&self, limit: usize) -> Result<Vec<EvaluationRecord>, rusqlite::Error> {
        let mut records = self.list(&EvaluationFilter {
            limit: Some(limit),
            ..Default::default()
        })?;
        records.reverse();
        Ok(records)
    }

    pub fn count(&self) -> Result<usize, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<EvaluationRecord, rusqlite::Error> {
        let created_at: String = row.get(7)?;
        Ok(EvaluationRecord {
            task_id: row.get(0)?,
            objective: row.get(1)?,
            domain: row.get(2)?,
            difficulty: row.get(3)?,
            overall_score: row.get(4)?,
            quality_score: row.get(5)?,
            accuracy: row.get(6)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, EvaluationFilter, EvaluationRecord};
    use chrono::{Duration, Utc};

    fn record(task_id: &str, domain: &str, overall: f64, minutes_ago: i64) -> EvaluationRecord {
        EvaluationRecord {
            task_id: task_id.to_string(),
            objective: format!("Objective for {}", task_id),
            domain: domain.to_string(),
            difficulty: "medium".to_string(),
            overall_score: overall,
            quality_score: overall + 5.0,
            accuracy: overall - 5.0,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_save_and_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.evaluations().save(&record("a", "finance", 60.0, 30)).unwrap();
        db.evaluations().save(&record("b", "science", 70.0, 20)).unwrap();
        db.evaluations().save(&record("c", "finance", 80.0, 10)).unwrap();

        let all = db.evaluations().list(&EvaluationFilter::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(db.evaluations().count().unwrap(), 3);
    }

    #[test]
    fn test_filter_by_domain() {
        let db = Database::open_in_memory().unwrap();
        db.evaluations().save(&record("a", "finance", 60.0, 30)).unwrap();
        db.evaluations().save(&record("b", "science", 70.0, 20)).unwrap();

        let finance = db
            .evaluations()
            .list(&EvaluationFilter {
                domain: Some("finance".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(finance.len(), 1);
        assert_eq!(finance[0].task_id, "a");
        assert_eq!(finance[0].quality_score, 65.0);
    }

    #[test]
    fn test_recent_is_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        for (i, minutes) in [50, 40, 30, 20, 10].into_iter().enumerate() {
            db.evaluations()
                .save(&record(&format!("t{}", i), "finance", 50.0 + i as f64, minutes))
                .unwrap();
        }

        let recent = db.evaluations().recent(3).unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
    }
}
