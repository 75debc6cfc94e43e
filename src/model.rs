//! Wire and domain types shared by the API layer, the stores, and the
//! dispatch protocol.
//!
//! JSON field names are camelCase except for the legacy aliases
//! (`test_name`, `test_purpose`, `run_uid`, `run_status`) that existing
//! API consumers depend on.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a run.
///
/// `new` and `started` are the queue states; `passed`, `failed`, and
/// `error` are terminal. Transitions are monotonic: a run never moves
/// back to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    New,
    Started,
    Passed,
    Failed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::New => "new",
            RunStatus::Started => "started",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "new" => Some(RunStatus::New),
            "started" => Some(RunStatus::Started),
            "passed" => Some(RunStatus::Passed),
            "failed" => Some(RunStatus::Failed),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Error
        )
    }

    /// Monotonic rank used for transition checks. Terminal states share a
    /// rank so a second reporting call may overwrite the first
    /// (last-write-wins).
    fn rank(&self) -> u8 {
        match self {
            RunStatus::New => 0,
            RunStatus::Started => 1,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Error => 2,
        }
    }

    /// Whether a run currently in `from` may move to `to`.
    pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
        to.rank() >= from.rank() && to != RunStatus::New
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// Outcome of a single step reported by a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Pass,
    Fail,
    Error,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Pass => "pass",
            StepOutcome::Fail => "fail",
            StepOutcome::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<StepOutcome> {
        match s {
            "pass" => Some(StepOutcome::Pass),
            "fail" => Some(StepOutcome::Fail),
            "error" => Some(StepOutcome::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// One row of `GET /run`, and the shape returned for a freshly created
/// run (where the joined test columns are absent).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub uid: String,
    pub test: String,
    #[serde(rename = "test_name", skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(rename = "test_purpose", skip_serializing_if = "Option::is_none")]
    pub test_purpose: Option<String>,
    pub created: String,
    pub status: RunStatus,
    pub browser: String,
    pub url_domain: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// `GET /run/{uid}` and the `PUT /run/{uid}` response: a run with its
/// recorded step outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: RunSummary,
    pub steps: Vec<RunStep>,
}

/// One recorded step outcome within a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStep {
    pub position: i64,
    pub description: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A step outcome as submitted by a runner. Position is assigned from
/// the submission order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStepReport {
    pub description: String,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub detail: Option<String>,
}

/// The result graph a runner submits when a run finishes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    #[serde(default)]
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub steps: Vec<RunStepReport>,
}

/// `PATCH /run/{uid}` body: a runner claiming a dequeued run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub status: RunStatus,
    pub start: chrono::DateTime<chrono::Utc>,
}

/// `POST /test/{uid}/run` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub browser: String,
    pub url_domain: String,
}

/// The execution payload handed to a runner by `GET /run/next`: the run
/// fields plus the owning test's URL path and ordered step script.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub uid: String,
    pub test: String,
    pub created: String,
    pub status: RunStatus,
    pub browser: String,
    pub url_domain: String,
    pub url_path: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub steps: Vec<TestStep>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// One scripted step of a test definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub position: i64,
    pub description: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A test step as submitted on create/update. Position is assigned from
/// the submission order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// One row of `GET /test`: the definition plus its step count and the
/// latest run for this test, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub uid: String,
    pub name: String,
    pub purpose: String,
    pub browser: String,
    pub url_domain: String,
    pub url_path: String,
    pub step_count: i64,
    #[serde(rename = "run_uid")]
    pub run_uid: Option<String>,
    #[serde(rename = "run_status")]
    pub run_status: Option<RunStatus>,
}

/// One row of `GET /test_dropdown` (collection editing).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDropdownRow {
    pub uid: String,
    pub name: String,
    pub purpose: String,
    pub browser: String,
    pub url_domain: String,
    pub url_path: String,
}

/// `GET /test/{uid}`: the definition with its ordered steps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetail {
    pub uid: String,
    pub name: String,
    pub purpose: String,
    pub browser: String,
    pub url_domain: String,
    pub url_path: String,
    #[serde(rename = "run_uid")]
    pub run_uid: Option<String>,
    #[serde(rename = "run_status")]
    pub run_status: Option<RunStatus>,
    pub steps: Vec<TestStep>,
}

/// Create/update body for a test definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInput {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub url_domain: String,
    #[serde(default)]
    pub url_path: String,
    #[serde(default)]
    pub steps: Vec<TestStepInput>,
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// One row of `GET /collection`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub uid: String,
    pub name: String,
    pub description: String,
    pub test_count: i64,
}

/// One (test, browser, urlDomain) tuple of a collection, joined with
/// the latest run for that exact combination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTestRow {
    pub test: String,
    pub browser: String,
    pub url_domain: String,
    #[serde(rename = "run_uid")]
    pub run_uid: Option<String>,
    #[serde(rename = "run_status")]
    pub run_status: Option<RunStatus>,
}

/// `GET /collection/{uid}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDetail {
    pub uid: String,
    pub name: String,
    pub description: String,
    pub tests: Vec<CollectionTestRow>,
}

/// A collection tuple as submitted on create/update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTestInput {
    pub test: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub url_domain: String,
}

/// Create/update body for a collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tests: Vec<CollectionTestInput>,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A role assignment, kept as an object for wire compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    pub role: String,
}

/// One row of `GET /user`. Password digests never leave the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleEntry>,
}

/// Create/update body for a user. On update a missing `password` leaves
/// the stored digest untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
