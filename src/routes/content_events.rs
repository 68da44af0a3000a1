//! Hooks the board service calls when content is created. The caller's
//! token identifies the author or commenter.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::content::{CommentCreated, ContentEventOutcome, ContentEvents};
use crate::services::keywords::PostCreated;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", post(post_created))
        .route("/comments", post(comment_created))
}

#[derive(Debug, Deserialize)]
pub struct PostCreatedRequest {
    pub post_id: String,
    pub category: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentCreatedRequest {
    pub comment_id: String,
    pub post_id: String,
    pub post_author_id: String,
    pub text: String,
}

async fn post_created(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<PostCreatedRequest>,
) -> AppResult<Json<ContentEventOutcome>> {
    let outcome = ContentEvents::from_state(&state)
        .post_created(&PostCreated {
            post_id: request.post_id,
            author_id: user.member_id,
            category: request.category,
            text: request.text,
        })
        .await?;
    Ok(Json(outcome))
}

async fn comment_created(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CommentCreatedRequest>,
) -> AppResult<Json<ContentEventOutcome>> {
    let outcome = ContentEvents::from_state(&state)
        .comment_created(&CommentCreated {
            comment_id: request.comment_id,
            post_id: request.post_id,
            post_author_id: request.post_author_id,
            commenter_id: user.member_id,
            text: request.text,
        })
        .await?;
    Ok(Json(outcome))
}
