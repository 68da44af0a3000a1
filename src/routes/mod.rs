use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

pub mod auth;
pub mod content_events;
pub mod health;
pub mod keywords;
pub mod notifications;
pub mod reservations;

/// Every route, with reservation admission unwrapped.
#[cfg(test)]
pub fn router() -> Router<Arc<AppState>> {
    build(reservations::admission_router())
}

/// Every route, with `admission` serving reservation creation. The server
/// passes the admission router with its rate limiter applied.
pub fn build(admission: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api/reservations",
            admission.merge(reservations::router()),
        )
        .nest("/api/members", reservations::members_router())
        .nest("/api/notifications", notifications::router())
        .nest("/api/keyword-subscriptions", keywords::router())
        .nest("/api/content-events", content_events::router())
}
