//! API layer -- axum router, handlers, and the authorization gate.

pub mod auth;
mod auth_routes;
mod collections;
pub mod error;
mod runs;
pub mod state;
mod users;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use self::state::AppState;

/// Build the application router with all API routes.
pub fn router(state: AppState, client_url: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/login", post(auth_routes::login))
        .route("/logout", post(auth_routes::logout))
        .route("/authenticated", post(auth_routes::authenticated))
        .route("/password", patch(auth_routes::change_password))
        .route("/user", get(users::list).post(users::create))
        .route(
            "/user/{uid}",
            get(users::get_one).put(users::update).delete(users::remove),
        )
        .route("/test", get(tests::list).post(tests::create))
        .route("/test_dropdown", get(tests::dropdown))
        .route(
            "/test/{uid}",
            get(tests::get_one).put(tests::update).delete(tests::remove),
        )
        .route("/test/{uid}/run", post(runs::run_test))
        .route(
            "/collection",
            get(collections::list).post(collections::create),
        )
        .route(
            "/collection/{uid}",
            get(collections::get_one)
                .put(collections::update)
                .delete(collections::remove),
        )
        .route("/collection/{uid}/run", post(runs::run_collection))
        .route("/run", get(runs::list))
        .route("/run/next", get(runs::next))
        .route(
            "/run/{uid}",
            get(runs::get_one)
                .patch(runs::claim)
                .put(runs::report)
                .delete(runs::remove),
        )
        .fallback(fallback);

    if let Some(origin) = client_url {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_credentials(true)
                        .allow_headers([CONTENT_TYPE, HeaderName::from_static(auth::RUNNER_HEADER)])
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::PATCH,
                            Method::DELETE,
                        ]),
                );
            }
            Err(e) => warn!(origin, error = %e, "invalid client_url, CORS disabled"),
        }
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
