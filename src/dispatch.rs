//! The run dispatch protocol: dequeue, claim, and result reporting.
//!
//! Runners poll for work with a read-only dequeue, claim a run with a
//! single conditional update, and hand back the full result graph in
//! one transactional reporting call. The conditional update is what
//! keeps two runners from executing the same run: both may dequeue the
//! same row, but only one claim can flip it from `new` to `started`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use crate::model::{DispatchPayload, RunDetail, RunReport, RunStatus, TestStep};
use crate::storage::runs::{fetch_detail, status_from_str};
use crate::storage::Pool;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a claim attempt against a specific run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The run was `new` and is now `started`.
    Started,
    /// The run exists but some runner already claimed it.
    AlreadyStarted,
    /// No run with that uid.
    NotFound,
}

/// Result of a reporting call.
#[derive(Debug)]
pub enum ReportOutcome {
    /// The run and its steps were written; the updated graph follows.
    Updated(RunDetail),
    /// The submitted status is not a legal transition for this run.
    Rejected(String),
    /// No run with that uid.
    NotFound,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// The runner-facing side of the run queue.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Pool,
}

impl Dispatcher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Select one pending run and assemble its execution payload: the
    /// run fields, the owning test's URL path, and the ordered step
    /// script copied at dispatch time.
    ///
    /// Read-only: the run stays `new` until a claim lands. Ordering is
    /// oldest-created first as a best effort, not a FIFO guarantee.
    pub fn next_pending(&self) -> Result<Option<DispatchPayload>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT r.uid, r.test, r.created, r.status, r.browser, r.url_domain,
                        t.url_path, r.start, r.\"end\"
                 FROM runs r
                 LEFT JOIN tests t ON t.uid = r.test
                 WHERE r.status = 'new'
                 ORDER BY r.created ASC, r.id ASC
                 LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((uid, test, created, status, browser, url_domain, url_path, start, end)) = row
        else {
            debug!("no pending runs");
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT s.position, s.description, s.command, s.target, s.value
             FROM tests_steps s
             JOIN tests t ON s.test = t.id
             WHERE t.uid = ?1
             ORDER BY s.position ASC",
        )?;
        let step_rows = stmt.query_map([&test], |row| {
            Ok(TestStep {
                position: row.get(0)?,
                description: row.get(1)?,
                command: row.get(2)?,
                target: row.get(3)?,
                value: row.get(4)?,
            })
        })?;

        let mut steps = Vec::new();
        for row in step_rows {
            steps.push(row?);
        }

        debug!(uid = uid.as_str(), steps = steps.len(), "dequeued pending run");
        Ok(Some(DispatchPayload {
            uid,
            test,
            created,
            status: status_from_str(&status)?,
            browser,
            url_domain,
            url_path,
            start,
            end,
            steps,
        }))
    }

    /// Claim a dequeued run: flip it from `new` to `started` and record
    /// the start timestamp, as one conditional update.
    pub fn claim(&self, uid: &str, start: DateTime<Utc>) -> Result<ClaimOutcome> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE runs SET status = 'started', start = ?2
             WHERE uid = ?1 AND status = 'new'",
            params![uid, start.to_rfc3339()],
        )?;
        if changed == 1 {
            info!(uid, "run claimed");
            return Ok(ClaimOutcome::Started);
        }

        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM runs WHERE uid = ?1", [uid], |row| row.get(0))
            .optional()?;
        if exists.is_some() {
            warn!(uid, "claim lost: run already started");
            Ok(ClaimOutcome::AlreadyStarted)
        } else {
            warn!(uid, "claim for unknown run");
            Ok(ClaimOutcome::NotFound)
        }
    }

    /// Record a runner's result graph: update the run's terminal fields
    /// and replace its step log, in one transaction.
    ///
    /// The submitted status must be terminal and must not regress the
    /// run. `start` is kept if already set; a second terminal report
    /// overwrites the first (last-write-wins).
    pub fn report(&self, uid: &str, report: &RunReport) -> Result<ReportOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                "SELECT id, status FROM runs WHERE uid = ?1",
                [uid],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((run_id, current)) = row else {
            return Ok(ReportOutcome::NotFound);
        };
        let current = status_from_str(&current)?;

        if !(report.status.is_terminal() && RunStatus::can_transition(current, report.status)) {
            return Ok(ReportOutcome::Rejected(format!(
                "cannot move run from '{current}' to '{}'; reports must carry a terminal status \
                 (passed, failed, or error)",
                report.status
            )));
        }

        tx.execute(
            "UPDATE runs SET status = ?2,
                    start = COALESCE(start, ?3),
                    \"end\" = COALESCE(?4, \"end\")
             WHERE id = ?1",
            params![
                run_id,
                report.status.as_str(),
                report.start.map(|t| t.to_rfc3339()),
                report.end.map(|t| t.to_rfc3339())
            ],
        )?;
        tx.execute("DELETE FROM runs_steps WHERE run = ?1", [run_id])?;
        for (index, step) in report.steps.iter().enumerate() {
            tx.execute(
                "INSERT INTO runs_steps (run, position, description, outcome, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    (index + 1) as i64,
                    step.description,
                    step.outcome.as_str(),
                    step.detail
                ],
            )?;
        }
        tx.commit()?;

        info!(
            uid,
            status = report.status.as_str(),
            steps = report.steps.len(),
            "run result recorded"
        );

        let detail = fetch_detail(&conn, uid, None)?
            .ok_or_else(|| anyhow::anyhow!("run vanished during report: {uid}"))?;
        Ok(ReportOutcome::Updated(detail))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
