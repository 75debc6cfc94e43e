//! Run persistence: submission inserts, org-scoped reads, deletion.
//!
//! The dispatch-side mutations (dequeue, claim, report) live in
//! [`crate::dispatch`]; this store covers the interactive surface.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::model::{RunDetail, RunStatus, RunStep, RunSummary, StepOutcome};
use crate::storage::Pool;

#[derive(Clone)]
pub struct RunStore {
    pool: Pool,
}

impl RunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert one run with status `new`, owned by `organization`.
    pub fn create(
        &self,
        organization: i64,
        test_uid: &str,
        browser: &str,
        url_domain: &str,
    ) -> Result<RunSummary> {
        let conn = self.pool.get()?;
        let uid = Uuid::new_v4().to_string();
        let created = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (uid, organization, test, browser, url_domain, status, created)
             VALUES (?1, ?2, ?3, ?4, ?5, 'new', ?6)",
            params![uid, organization, test_uid, browser, url_domain, created],
        )?;
        Ok(RunSummary {
            uid,
            test: test_uid.to_string(),
            test_name: None,
            test_purpose: None,
            created,
            status: RunStatus::New,
            browser: browser.to_string(),
            url_domain: url_domain.to_string(),
            start: None,
            end: None,
        })
    }

    /// All runs of an organization, newest first, joined with the test's
    /// name and purpose.
    pub fn list(&self, organization: i64) -> Result<Vec<RunSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT r.uid, r.test, t.name, t.purpose, r.created, r.status,
                    r.browser, r.url_domain, r.start, r.\"end\"
             FROM runs r
             LEFT JOIN tests t ON t.uid = r.test
             WHERE r.organization = ?1
             ORDER BY r.created DESC, r.id DESC",
        )?;
        let rows = stmt.query_map([organization], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (uid, test, test_name, test_purpose, created, status, browser, url_domain, start, end) =
                row?;
            runs.push(RunSummary {
                uid,
                test,
                test_name,
                test_purpose,
                created,
                status: status_from_str(&status)?,
                browser,
                url_domain,
                start,
                end,
            });
        }
        Ok(runs)
    }

    /// One run with its recorded steps, scoped to `organization`.
    pub fn get(&self, organization: i64, uid: &str) -> Result<Option<RunDetail>> {
        let conn = self.pool.get()?;
        fetch_detail(&conn, uid, Some(organization))
    }

    /// Delete a run (steps cascade). Returns the number of deleted rows.
    pub fn delete(&self, organization: i64, uid: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM runs WHERE uid = ?1 AND organization = ?2",
            params![uid, organization],
        )?;
        Ok(deleted)
    }
}

/// Fetch a run graph by uid. `organization = None` skips tenant scoping
/// (runner-facing reads).
pub(crate) fn fetch_detail(
    conn: &Connection,
    uid: &str,
    organization: Option<i64>,
) -> Result<Option<RunDetail>> {
    let row = conn
        .query_row(
            "SELECT r.id, r.uid, r.test, t.name, t.purpose, r.created, r.status,
                    r.browser, r.url_domain, r.start, r.\"end\"
             FROM runs r
             LEFT JOIN tests t ON t.uid = r.test
             WHERE r.uid = ?1 AND (?2 IS NULL OR r.organization = ?2)",
            params![uid, organization],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, uid, test, test_name, test_purpose, created, status, browser, url_domain, start, end)) =
        row
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT position, description, outcome, detail
         FROM runs_steps WHERE run = ?1 ORDER BY position ASC",
    )?;
    let step_rows = stmt.query_map([run_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut steps = Vec::new();
    for row in step_rows {
        let (position, description, outcome, detail) = row?;
        steps.push(RunStep {
            position,
            description,
            outcome: outcome_from_str(&outcome)?,
            detail,
        });
    }

    Ok(Some(RunDetail {
        run: RunSummary {
            uid,
            test,
            test_name,
            test_purpose,
            created,
            status: status_from_str(&status)?,
            browser,
            url_domain,
            start,
            end,
        },
        steps,
    }))
}

pub(crate) fn status_from_str(s: &str) -> Result<RunStatus> {
    RunStatus::parse(s).ok_or_else(|| anyhow::anyhow!("unknown run status in store: {s}"))
}

pub(crate) fn outcome_from_str(s: &str) -> Result<StepOutcome> {
    StepOutcome::parse(s).ok_or_else(|| anyhow::anyhow!("unknown step outcome in store: {s}"))
}
