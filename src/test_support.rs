//! Shared fixtures for in-crate tests.

use std::str::FromStr;
use std::sync::Arc;

use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use http::StatusCode;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::{ReserverInfo, VenueKind};
use crate::routes::auth::{Claims, Role};
use crate::services::availability::AvailabilityLedger;
use crate::services::live::LiveChannelRegistry;
use crate::AppState;

pub const JWT_SECRET: &str = "test-secret";

/// Private in-memory database with migrations applied.
///
/// The pool holds a single connection that never expires, since every
/// connection to `sqlite::memory:` is a separate database.
pub async fn pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.jwt.secret = JWT_SECRET.to_string();
    config.reminder.poll_interval_seconds = 1;
    config
}

pub async fn state() -> Arc<AppState> {
    let config = config();
    Arc::new(AppState {
        db: pool().await,
        ledger: Arc::new(AvailabilityLedger::new()),
        live: Arc::new(LiveChannelRegistry::new(config.live.channel_buffer)),
        config,
    })
}

pub async fn seed_member(pool: &SqlitePool, id: &str, display_name: &str) {
    sqlx::query("INSERT INTO members (id, display_name, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(display_name)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_venue(pool: &SqlitePool, id: &str, name: &str, kind: VenueKind) {
    sqlx::query(
        r#"
        INSERT INTO venues (id, name, address, latitude, longitude, kind, is_active, created_at)
        VALUES (?, ?, '1 Test-ro, Seoul', 37.5665, 126.9780, ?, 1, ?)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(kind)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_doctor(pool: &SqlitePool, id: &str, venue_id: &str) {
    sqlx::query(
        "INSERT INTO doctors (id, venue_id, name, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
    )
    .bind(id)
    .bind(venue_id)
    .bind(format!("Dr. {}", id))
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await
    .unwrap();
}

pub fn reserver() -> ReserverInfo {
    ReserverInfo {
        reserver_name: "Kim Minji".to_string(),
        reserver_phone: "010-1234-5678".to_string(),
        pet_name: "Coco".to_string(),
        memo: None,
    }
}

/// Bearer token as the external issuer would sign it.
pub fn token_for(member_id: &str, role: Role) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: member_id.to_string(),
        role,
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Run one request through `app` and decode the JSON body (`Null` when empty).
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
