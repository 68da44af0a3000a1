use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::db::Notification;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::notifications::{NotificationHub, NotificationPage};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/stream", get(stream_notifications))
        .route("/:id/read", post(mark_read))
        .route("/:id", delete(delete_notification))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub last_event_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the current member's notifications, newest first
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationPage>> {
    let page = NotificationHub::from_state(&state)
        .list_for(
            &user.member_id,
            query.unread_only,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(20),
        )
        .await?;
    Ok(Json(page))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let count = NotificationHub::from_state(&state)
        .count_unread(&user.member_id)
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    let notification = NotificationHub::from_state(&state)
        .mark_read(&user.member_id, &id)
        .await?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<MarkAllReadResponse>> {
    let updated = NotificationHub::from_state(&state)
        .mark_all_read(&user.member_id)
        .await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    NotificationHub::from_state(&state)
        .delete(&user.member_id, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events. A reconnecting client passes the last seen event id
/// (`Last-Event-ID` header, or `last_event_id` query) to replay what it missed.
async fn stream_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .or(query.last_event_id);

    let notifications = NotificationHub::from_state(&state)
        .connect(&user.member_id, last_event_id)
        .await?;

    let events = notifications.map(|notification| {
        let event = Event::default()
            .id(notification.event_id.to_string())
            .event("notification")
            .json_data(&notification)
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to serialize notification {}: {:?}",
                    notification.id,
                    e
                );
                Event::default().comment("unserializable notification")
            });
        Ok(event)
    });

    let keep_alive = KeepAlive::new().interval(Duration::from_secs(
        state.config.live.keep_alive_seconds.max(1),
    ));
    Ok(Sse::new(events).keep_alive(keep_alive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateNotification, NotificationType};
    use crate::routes::auth::Role;
    use crate::test_support::{self, request, send, token_for};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn note(receiver: &str, title: &str) -> CreateNotification {
        CreateNotification {
            receiver_id: receiver.to_string(),
            actor_id: None,
            notification_type: NotificationType::Comment,
            target: None,
            title: title.to_string(),
            message: "body".to_string(),
            link: None,
        }
    }

    async fn app() -> (Arc<AppState>, Router) {
        let state = test_support::state().await;
        let app = crate::routes::router().with_state(state.clone());
        (state, app)
    }

    #[tokio::test]
    async fn list_read_and_delete_own_notifications() {
        let (state, app) = app().await;
        let hub = NotificationHub::from_state(&state);
        let first = hub.create_and_push(note("m-1", "first")).await.unwrap();
        hub.create_and_push(note("m-1", "second")).await.unwrap();
        let foreign = hub.create_and_push(note("m-2", "other")).await.unwrap();
        let token = token_for("m-1", Role::User);

        let (status, body) =
            send(&app, request("GET", "/api/notifications?per_page=10", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["items"][0]["title"], "second");

        let (status, body) = send(
            &app,
            request("POST", &format!("/api/notifications/{}/read", first.id), Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_read"], true);

        let (_, body) =
            send(&app, request("GET", "/api/notifications/unread-count", Some(&token), None)).await;
        assert_eq!(body["count"], 1);

        let (_, body) = send(
            &app,
            request("GET", "/api/notifications?unread_only=true", Some(&token), None),
        )
        .await;
        assert_eq!(body["total"], 1);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/api/notifications/{}", foreign.id), Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&app, request("POST", "/api/notifications/read-all", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 1);

        let (status, _) = send(
            &app,
            request("DELETE", &format!("/api/notifications/{}", first.id), Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn stream_replays_after_last_event_id() {
        let (state, app) = app().await;
        let hub = NotificationHub::from_state(&state);
        let seen = hub.create_and_push(note("m-1", "seen")).await.unwrap();
        hub.create_and_push(note("m-1", "missed")).await.unwrap();
        let token = token_for("m-1", Role::User);

        let mut req = request("GET", "/api/notifications/stream", Some(&token), None);
        req.headers_mut().insert(
            "last-event-id",
            http::HeaderValue::from_str(&seen.event_id.to_string()).unwrap(),
        );
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body();
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.contains("event: notification"));
        assert!(text.contains("missed"));
        assert!(!text.contains("\"seen\""));
    }

    #[tokio::test]
    async fn stream_requires_authentication() {
        let (_, app) = app().await;
        let (status, _) =
            send(&app, request("GET", "/api/notifications/stream", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
