//! In-memory login sessions.
//!
//! Sessions are opaque UUID tokens handed out at login and carried in a
//! cookie. Each entry holds the user's identity, organization, and role
//! names, and expires after a configurable idle period. State lives
//! behind an async-aware lock so the store is safe to share across
//! request tasks.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Identity snapshot carried by a session and echoed to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub uid: String,
    pub name: String,
    pub email: String,
}

/// One established login session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: SessionUser,
    pub organization: i64,
    pub roles: Vec<String>,
    last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(user: SessionUser, organization: i64, roles: Vec<String>) -> Self {
        Self {
            user,
            organization,
            roles,
            last_seen: Utc::now(),
        }
    }
}

/// Thread-safe session store with idle expiry.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_minutes: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes as i64),
        }
    }

    /// Store a session and return its opaque token.
    pub async fn insert(&self, session: Session) -> String {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().await;
        info!(user = session.user.email.as_str(), "session established");
        sessions.insert(token.clone(), session);
        token
    }

    /// Look up a session by token. Expired entries are dropped; live
    /// entries have their idle clock reset.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let now = Utc::now();
        match sessions.get_mut(token) {
            Some(session) if session.last_seen + self.ttl > now => {
                session.last_seen = now;
                Some(session.clone())
            }
            Some(_) => {
                debug!("session expired");
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Drop a session (logout). Returns whether it existed.
    pub async fn remove(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token).is_some()
    }

    /// Number of live entries, expired or not.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
