//! Trade journal: cascades, attempts and results as they happen

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::core::cascade::{Attempt, AttemptSink, Cascade, CascadeId};
use crate::core::types::Outcome;
use crate::db::Database;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub id: i64,
    pub cascade_id: String,
    pub pair: String,
    pub level: u32,
    pub fire_time: String,
    pub stake_amount: f64,
    pub direction: String,
    pub state: String,
    pub reason: Option<String>,
    pub scheduled_at: String,
    pub settled_at: Option<String>,
}

impl AttemptRecord {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(AttemptRecord {
            id: row.get(0)?,
            cascade_id: row.get(1)?,
            pair: row.get(2)?,
            level: row.get(3)?,
            fire_time: row.get(4)?,
            stake_amount: row.get(5)?,
            direction: row.get(6)?,
            state: row.get(7)?,
            reason: row.get(8)?,
            scheduled_at: row.get(9)?,
            settled_at: row.get(10)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub cascade_id: String,
    pub level: u32,
    pub outcome: String,
    pub observed_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttemptCounts {
    pub scheduled: i64,
    pub executed: i64,
    pub failed: i64,
    pub suppressed: i64,
}

impl AttemptCounts {
    pub fn total(&self) -> i64 {
        self.scheduled + self.executed + self.failed + self.suppressed
    }
}

/// Summary written when a cascade leaves the registry
fn final_state(cascade: &Cascade) -> &'static str {
    if cascade.won_at.is_some() {
        "won"
    } else if cascade.exhausted {
        "lost"
    } else if cascade.last_placed_level.is_none() {
        "not_traded"
    } else {
        "unresolved"
    }
}

#[derive(Clone)]
pub struct TradeJournal {
    conn: Arc<Mutex<Connection>>,
}

impl TradeJournal {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.get_connection(),
        }
    }

    /// Insert the cascade and all its attempts in one transaction
    pub fn record_cascade_opened(&self, cascade: &Cascade) -> SqlResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO cascades (id, pair, direction, entry_time, max_levels, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cascade.id.to_string(),
                cascade.pair,
                cascade.direction.as_str(),
                cascade.entry_time.to_string(),
                cascade.max_levels,
                cascade.created_at.to_rfc3339(),
            ],
        )?;

        for attempt in &cascade.attempts {
            tx.execute(
                "INSERT INTO attempts (
                    cascade_id, level, fire_time, stake_amount, direction, state, scheduled_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    cascade.id.to_string(),
                    attempt.level,
                    attempt.fire_time.to_string(),
                    attempt.stake_amount,
                    attempt.direction.as_str(),
                    attempt.state.label(),
                    now,
                ],
            )?;
        }

        tx.commit()
    }

    /// Update an attempt's terminal state
    pub fn record_attempt(&self, cascade_id: CascadeId, attempt: &Attempt) -> SqlResult<usize> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE attempts SET state = ?1, reason = ?2, settled_at = ?3
             WHERE cascade_id = ?4 AND level = ?5",
            params![
                attempt.state.label(),
                attempt.state.reason(),
                Utc::now().to_rfc3339(),
                cascade_id.to_string(),
                attempt.level,
            ],
        )
    }

    pub fn record_result(&self, cascade_id: CascadeId, level: u32, outcome: Outcome) -> SqlResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO results (cascade_id, level, outcome, observed_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                cascade_id.to_string(),
                level,
                outcome.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_cascade_closed(&self, cascade: &Cascade) -> SqlResult<usize> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cascades SET closed_at = ?1, final_state = ?2 WHERE id = ?3",
            params![
                Utc::now().to_rfc3339(),
                final_state(cascade),
                cascade.id.to_string()
            ],
        )
    }

    /// Most recent attempts first
    pub fn recent_attempts(&self, limit: usize) -> SqlResult<Vec<AttemptRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.cascade_id, c.pair, a.level, a.fire_time, a.stake_amount,
                    a.direction, a.state, a.reason, a.scheduled_at, a.settled_at
             FROM attempts a
             JOIN cascades c ON c.id = a.cascade_id
             ORDER BY a.id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| AttemptRecord::from_row(row))?;
        rows.collect()
    }

    pub fn attempts_for(&self, cascade_id: CascadeId) -> SqlResult<Vec<AttemptRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.cascade_id, c.pair, a.level, a.fire_time, a.stake_amount,
                    a.direction, a.state, a.reason, a.scheduled_at, a.settled_at
             FROM attempts a
             JOIN cascades c ON c.id = a.cascade_id
             WHERE a.cascade_id = ?1
             ORDER BY a.level",
        )?;

        let rows = stmt.query_map(params![cascade_id.to_string()], |row| AttemptRecord::from_row(row))?;
        rows.collect()
    }

    pub fn results_for(&self, cascade_id: CascadeId) -> SqlResult<Vec<ResultRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT cascade_id, level, outcome, observed_at
             FROM results WHERE cascade_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![cascade_id.to_string()], |row| {
            Ok(ResultRecord {
                cascade_id: row.get(0)?,
                level: row.get(1)?,
                outcome: row.get(2)?,
                observed_at: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn cascade_final_state(&self, cascade_id: CascadeId) -> SqlResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT final_state FROM cascades WHERE id = ?1",
            params![cascade_id.to_string()],
            |row| row.get(0),
        )
    }

    /// Attempt totals by state
    pub fn attempt_counts(&self) -> SqlResult<AttemptCounts> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN state = 'scheduled' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'executed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'suppressed' THEN 1 ELSE 0 END), 0)
             FROM attempts",
            [],
            |row| {
                Ok(AttemptCounts {
                    scheduled: row.get(0)?,
                    executed: row.get(1)?,
                    failed: row.get(2)?,
                    suppressed: row.get(3)?,
                })
            },
        )
    }
}

impl AttemptSink for TradeJournal {
    fn cascade_opened(&self, cascade: &Cascade) {
        if let Err(e) = self.record_cascade_opened(cascade) {
            warn!("⚠️ Journal: failed to record cascade {}: {}", cascade.id, e);
        }
    }

    fn attempt_settled(&self, cascade_id: CascadeId, attempt: &Attempt) {
        if let Err(e) = self.record_attempt(cascade_id, attempt) {
            warn!("⚠️ Journal: failed to record level {} of {}: {}", attempt.level, cascade_id, e);
        }
    }

    fn result_applied(&self, cascade_id: CascadeId, level: u32, outcome: Outcome) {
        if let Err(e) = self.record_result(cascade_id, level, outcome) {
            warn!("⚠️ Journal: failed to record {} for {}: {}", outcome, cascade_id, e);
        }
    }

    fn cascade_closed(&self, cascade: &Cascade) {
        if let Err(e) = self.record_cascade_closed(cascade) {
            warn!("⚠️ Journal: failed to close cascade {}: {}", cascade.id, e);
        }
    }
}
