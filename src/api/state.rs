//! Shared state handed to every handler.

use std::sync::Arc;

use crate::api::auth::AuthGate;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::session::SessionStore;
use crate::storage::{CollectionStore, Pool, RunStore, TestStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub tests: TestStore,
    pub collections: CollectionStore,
    pub runs: RunStore,
    pub dispatcher: Dispatcher,
    pub auth: AuthGate,
    pub sessions: Arc<SessionStore>,
    pub password_salt: Arc<str>,
}

impl AppState {
    pub fn new(pool: Pool, sessions: Arc<SessionStore>, config: &Config) -> Self {
        Self {
            users: UserStore::new(pool.clone()),
            tests: TestStore::new(pool.clone()),
            collections: CollectionStore::new(pool.clone()),
            runs: RunStore::new(pool.clone()),
            dispatcher: Dispatcher::new(pool),
            auth: AuthGate::new(&config.auth.runner_secret, sessions.clone()),
            sessions,
            password_salt: config.auth.password_salt.as_str().into(),
        }
    }
}
