use crate::export::SessionLog;
use crate::scoring::{FeedbackCategory, GameVariant};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trial_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_started TEXT NOT NULL,
    variant TEXT NOT NULL,
    trial INTEGER NOT NULL,
    side TEXT,
    delay_secs REAL NOT NULL,
    duration_secs REAL NOT NULL,
    response_secs REAL NOT NULL,
    success BOOLEAN NOT NULL,
    key_correct BOOLEAN NOT NULL,
    accuracy REAL NOT NULL,
    category TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_trial_results_variant ON trial_results(variant);
CREATE INDEX IF NOT EXISTS idx_trial_results_session ON trial_results(session_started);
"#;

/// One stored trial, as read back for history views
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrial {
    pub session_started: DateTime<Local>,
    pub trial: usize,
    pub response_secs: f64,
    pub success: bool,
    pub category: Option<FeedbackCategory>,
}

/// Totals across every stored session of one game variant
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub variant: GameVariant,
    pub sessions: i64,
    pub trials: i64,
    pub successes: i64,
    pub mean_success_secs: Option<f64>,
    pub best_success_secs: Option<f64>,
    pub mean_accuracy: Option<f64>,
}

impl HistorySummary {
    pub fn success_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.trials as f64 * 100.0
        }
    }
}

/// SQLite store of every scored trial, across sessions
#[derive(Debug)]
pub struct ResultsDb {
    conn: Connection,
}

impl ResultsDb {
    /// Opens (creating if needed) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Stores every entry of a session log in one transaction
    pub fn record_session(&mut self, log: &SessionLog) -> Result<usize> {
        let started = log.started_at.to_rfc3339();
        let variant = log.variant.to_string();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO trial_results
                (session_started, variant, trial, side, delay_secs, duration_secs,
                 response_secs, success, key_correct, accuracy, category)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for entry in &log.entries {
                stmt.execute(params![
                    started,
                    variant,
                    entry.trial as i64,
                    entry.config.side().map(|s| s.to_string()),
                    entry.config.delay().as_secs_f64(),
                    entry.config.display_duration().as_secs_f64(),
                    entry.result.response_time_secs,
                    entry.result.success,
                    entry.result.key_correct,
                    entry.result.accuracy,
                    entry.result.category.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(log.entries.len())
    }

    pub fn summary(&self, variant: GameVariant) -> Result<HistorySummary> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                COUNT(DISTINCT session_started),
                COUNT(*),
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                AVG(CASE WHEN success = 1 THEN response_secs END),
                MIN(CASE WHEN success = 1 THEN response_secs END),
                AVG(CASE WHEN success = 1 THEN accuracy END)
            FROM trial_results
            WHERE variant = ?1
            "#,
        )?;

        stmt.query_row([variant.to_string()], |row| {
            Ok(HistorySummary {
                variant,
                sessions: row.get(0)?,
                trials: row.get(1)?,
                successes: row.get(2)?,
                mean_success_secs: row.get(3)?,
                best_success_secs: row.get(4)?,
                mean_accuracy: row.get(5)?,
            })
        })
    }

    /// Most recent trials first
    pub fn recent_trials(&self, variant: GameVariant, limit: usize) -> Result<Vec<StoredTrial>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT session_started, trial, response_secs, success, category
            FROM trial_results
            WHERE variant = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![variant.to_string(), limit as i64], |row| {
            let started: String = row.get(0)?;
            let session_started = DateTime::parse_from_rfc3339(&started)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        0,
                        "session_started".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            let trial: i64 = row.get(1)?;
            let category: String = row.get(4)?;

            Ok(StoredTrial {
                session_started,
                trial: trial as usize,
                response_secs: row.get(2)?,
                success: row.get(3)?,
                category: FeedbackCategory::from_name(&category),
            })
        })?;

        let mut trials = Vec::new();
        for trial in rows {
            trials.push(trial?);
        }
        Ok(trials)
    }

    /// Drops every stored trial, across all variants
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM trial_results", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SessionAggregator;
    use crate::session::SessionConfig;
    use crate::trial::{Side, TrialConfig, TrialResult};
    use std::time::Duration;

    fn result(category: FeedbackCategory, rt: f64, accuracy: f64) -> TrialResult {
        TrialResult {
            response_time_secs: rt,
            success: category == FeedbackCategory::Correct,
            key_correct: category == FeedbackCategory::Correct,
            accuracy,
            category,
        }
    }

    fn log(variant: GameVariant, results: Vec<TrialResult>, started: DateTime<Local>) -> SessionLog {
        let trial =
            TrialConfig::new(Duration::from_secs(1), Duration::from_secs(2), Some(Side::Right))
                .unwrap();
        let mut agg = SessionAggregator::new(vec![trial; results.len()]);
        for r in results {
            agg.append(r).unwrap();
        }
        agg.into_log(variant, SessionConfig::default(), started)
    }

    #[test]
    fn summary_of_empty_history() {
        let db = ResultsDb::open_in_memory().unwrap();
        let summary = db.summary(GameVariant::React).unwrap();
        assert_eq!(summary.trials, 0);
        assert_eq!(summary.successes, 0);
        assert_eq!(summary.mean_success_secs, None);
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn summary_counts_successes_per_variant() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        let t0 = Local::now();
        let t1 = t0 + chrono::Duration::seconds(60);

        db.record_session(&log(
            GameVariant::TippingPoint,
            vec![
                result(FeedbackCategory::Correct, 0.4, 0.8),
                result(FeedbackCategory::WrongKey, 0.5, 0.0),
            ],
            t0,
        ))
        .unwrap();
        db.record_session(&log(
            GameVariant::TippingPoint,
            vec![
                result(FeedbackCategory::Correct, 0.2, 0.9),
                result(FeedbackCategory::Timeout, 0.0, 0.0),
            ],
            t1,
        ))
        .unwrap();
        db.record_session(&log(
            GameVariant::React,
            vec![result(FeedbackCategory::Correct, 0.3, 0.7)],
            t1,
        ))
        .unwrap();

        let summary = db.summary(GameVariant::TippingPoint).unwrap();
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.trials, 4);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.success_rate(), 50.0);
        assert!((summary.mean_success_secs.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(summary.best_success_secs, Some(0.2));
        assert!((summary.mean_accuracy.unwrap() - 0.85).abs() < 1e-9);

        let react = db.summary(GameVariant::React).unwrap();
        assert_eq!(react.trials, 1);
    }

    #[test]
    fn recent_trials_newest_first() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.record_session(&log(
            GameVariant::React,
            vec![
                result(FeedbackCategory::Guess, 0.05, 0.0),
                result(FeedbackCategory::Correct, 0.31, 0.6),
            ],
            Local::now(),
        ))
        .unwrap();

        let recent = db.recent_trials(GameVariant::React, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].trial, 1);
        assert_eq!(recent[0].category, Some(FeedbackCategory::Correct));
        assert_eq!(recent[1].category, Some(FeedbackCategory::Guess));
        assert!(!recent[1].success);
    }

    #[test]
    fn clear_all_empties_history() {
        let mut db = ResultsDb::open_in_memory().unwrap();
        db.record_session(&log(
            GameVariant::React,
            vec![result(FeedbackCategory::Correct, 0.3, 0.7)],
            Local::now(),
        ))
        .unwrap();
        db.clear_all().unwrap();
        assert_eq!(db.summary(GameVariant::React).unwrap().trials, 0);
    }

    #[test]
    fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        {
            let mut db = ResultsDb::open(&path).unwrap();
            db.record_session(&log(
                GameVariant::React,
                vec![result(FeedbackCategory::Correct, 0.3, 0.7)],
                Local::now(),
            ))
            .unwrap();
        }
        assert!(path.exists());
        let db = ResultsDb::open(&path).unwrap();
        assert_eq!(db.summary(GameVariant::React).unwrap().trials, 1);
    }
}
