//! testdeck -- Self-hosted REST backend for browser UI-test management.
//!
//! This crate stores users, test definitions, collections, and test
//! executions ("runs") in SQLite and exposes a role-gated CRUD surface
//! plus a work-queue dispatch protocol for autonomous test runners.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod session;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::session::SessionStore;

/// Start the testdeck server: open the database, run migrations, and
/// serve the API.
pub async fn serve(config: Config) -> Result<()> {
    tracing::info!(db_path = config.database.path.as_str(), "initializing database");
    let pool = storage::open_pool(&config.database.path)?;

    let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_minutes));
    let state = api::state::AppState::new(pool, sessions, &config);

    if config.auth.runner_secret.is_empty() {
        tracing::warn!("no runner secret configured; dispatch endpoints will reject all runners");
    }

    let addr: std::net::SocketAddr = config.server.listen_address.parse()?;
    let app = api::router(state, config.server.client_url.as_deref());

    tracing::info!(%addr, "testdeck listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
