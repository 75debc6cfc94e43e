//! Authorization gate for the API surface.
//!
//! Every request carries either a runner credential header (a shared
//! secret), an established login session, or neither. A valid runner
//! credential authorizes any endpoint regardless of the permission the
//! endpoint declares; a session authorizes an endpoint iff the required
//! permission name is in its role list. Everything else is a 401 and
//! the operation is never attempted.

use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::error::ApiError;
use crate::session::{Session, SessionStore};

/// Header carrying the runner shared secret.
pub const RUNNER_HEADER: &str = "x-runner";

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "testdeck_session";

/// Permission name declared by the dispatch endpoints. Not part of any
/// ordinary role set; runners satisfy it through the credential header.
pub const PERM_RUNNER: &str = "RUNNER";

/// Every assignable role, for the admin bootstrap.
pub const ALL_ROLES: &[&str] = &[
    "user_read",
    "user_add",
    "user_update",
    "user_delete",
    "test_read",
    "test_add",
    "test_update",
    "test_delete",
    "test_run",
    "collection_read",
    "collection_add",
    "collection_update",
    "collection_delete",
    "collection_run",
    "run_read",
    "run_delete",
];

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// The authenticated identity behind a request.
#[derive(Debug, Clone)]
pub enum Caller {
    /// A runner agent holding the shared secret. No organization scope.
    Runner,
    /// A human user with an established session.
    User(Session),
}

impl Caller {
    pub fn organization(&self) -> Option<i64> {
        match self {
            Caller::Runner => None,
            Caller::User(session) => Some(session.organization),
        }
    }
}

/// Resolve the caller's organization, for handlers whose queries are
/// tenant-scoped. Runner credentials pass the gate everywhere but carry
/// no organization, so these endpoints cannot serve them.
pub fn require_org(caller: &Caller) -> Result<i64, ApiError> {
    caller.organization().ok_or_else(|| {
        ApiError::Validation("runner credential has no organization scope".to_string())
    })
}

// ---------------------------------------------------------------------------
// AuthGate
// ---------------------------------------------------------------------------

/// Decides allow/deny per request, before any data access runs.
#[derive(Clone)]
pub struct AuthGate {
    /// SHA-256 of the configured runner secret. `None` when no secret
    /// is configured, which disables runner access entirely.
    runner_secret_digest: Option<[u8; 32]>,
    sessions: Arc<SessionStore>,
}

impl AuthGate {
    pub fn new(runner_secret: &str, sessions: Arc<SessionStore>) -> Self {
        let runner_secret_digest = if runner_secret.is_empty() {
            None
        } else {
            Some(sha256(runner_secret.as_bytes()))
        };
        Self {
            runner_secret_digest,
            sessions,
        }
    }

    /// Check the request's credentials against `permission`.
    ///
    /// The runner header is compared digest-to-digest, so the check
    /// cost does not depend on how much of the secret an attacker
    /// guessed right.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        permission: &str,
    ) -> Result<Caller, ApiError> {
        if let (Some(value), Some(expected)) =
            (headers.get(RUNNER_HEADER), self.runner_secret_digest)
        {
            if let Ok(presented) = value.to_str() {
                if sha256(presented.as_bytes()) == expected {
                    debug!(permission, "runner credential accepted");
                    return Ok(Caller::Runner);
                }
            }
        }

        if let Some(session) = self.session(headers).await {
            if session.roles.iter().any(|role| role == permission) {
                debug!(permission, user = session.user.email.as_str(), "role accepted");
                return Ok(Caller::User(session));
            }
        }

        debug!(permission, "authorization denied");
        Err(ApiError::Unauthorized)
    }

    /// The request's session, if its cookie resolves to a live one.
    pub async fn session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = session_token(headers)?;
        self.sessions.get(&token).await
    }
}

/// Extract the session token from the `Cookie` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(SESSION_COOKIE)?
            .strip_prefix('=')
            .map(str::to_string)
    })
}

// ---------------------------------------------------------------------------
// Password digests
// ---------------------------------------------------------------------------

/// Digest stored for a user: salted SHA-256 over email + password.
pub fn password_digest(email: &str, password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented password against the stored digest.
pub fn verify_password(email: &str, password: &str, salt: &str, stored: &str) -> bool {
    let presented = password_digest(email, password, salt);
    sha256(presented.as_bytes()) == sha256(stored.as_bytes())
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
