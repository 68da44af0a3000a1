use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::db::KeywordSubscription;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::keywords::KeywordMatcher;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_subscriptions).post(subscribe))
        .route("/:id", delete(unsubscribe))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub keyword: String,
    /// Restrict matching to one board category.
    pub scope: Option<String>,
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<KeywordSubscription>>> {
    let subscriptions = KeywordMatcher::from_state(&state)
        .list(&user.member_id)
        .await?;
    Ok(Json(subscriptions))
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<KeywordSubscription>)> {
    let subscription = KeywordMatcher::from_state(&state)
        .subscribe(&user.member_id, &request.keyword, request.scope.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    KeywordMatcher::from_state(&state)
        .unsubscribe(&user.member_id, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::Role;
    use crate::test_support::{self, request, send, token_for};
    use serde_json::json;

    #[tokio::test]
    async fn subscribe_list_and_unsubscribe() {
        let state = test_support::state().await;
        let app = crate::routes::router().with_state(state);
        let token = token_for("alice", Role::User);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/keyword-subscriptions",
                Some(&token),
                Some(json!({ "keyword": "  vaccine ", "scope": "health" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["keyword"], "vaccine");
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/keyword-subscriptions",
                Some(&token),
                Some(json!({ "keyword": "vaccine", "scope": "health" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (_, body) =
            send(&app, request("GET", "/api/keyword-subscriptions", Some(&token), None)).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            request(
                "DELETE",
                &format!("/api/keyword-subscriptions/{}", id),
                Some(&token),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn blank_keyword_is_rejected() {
        let state = test_support::state().await;
        let app = crate::routes::router().with_state(state);
        let token = token_for("alice", Role::User);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/keyword-subscriptions",
                Some(&token),
                Some(json!({ "keyword": "   " })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
