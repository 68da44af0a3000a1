//! Content events reported by the board service: new posts are matched
//! against keyword subscriptions, new comments notify the post author.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{CreateNotification, NotificationTarget, NotificationType};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::directory::{MemberDirectory, SqliteDirectory};
use crate::services::keywords::{KeywordMatcher, PostCreated};
use crate::services::notifications::NotificationHub;
use crate::AppState;

const EXCERPT_CHARS: usize = 80;

/// First characters of `text` on one line, with an ellipsis when cut.
pub fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentCreated {
    pub comment_id: String,
    pub post_id: String,
    pub post_author_id: String,
    pub commenter_id: String,
    pub text: String,
}

/// How many notifications a content event produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentEventOutcome {
    pub notified: usize,
}

pub struct ContentEvents {
    keywords: KeywordMatcher,
    hub: NotificationHub,
    members: Arc<dyn MemberDirectory>,
}

impl ContentEvents {
    pub fn new(
        keywords: KeywordMatcher,
        hub: NotificationHub,
        members: Arc<dyn MemberDirectory>,
    ) -> Self {
        Self {
            keywords,
            hub,
            members,
        }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(
            KeywordMatcher::from_state(state),
            NotificationHub::from_state(state),
            Arc::new(SqliteDirectory::new(state.db.clone())),
        )
    }

    pub async fn post_created(&self, post: &PostCreated) -> AppResult<ContentEventOutcome> {
        if post.text.trim().is_empty() {
            return Err(AppError::Validation(i18n::t("validation.content_text_required")));
        }
        let notified = self.keywords.on_content_created(post).await?;
        Ok(ContentEventOutcome { notified })
    }

    /// Notify the post author about a comment, unless they wrote it themselves.
    pub async fn comment_created(
        &self,
        comment: &CommentCreated,
    ) -> AppResult<ContentEventOutcome> {
        if comment.text.trim().is_empty() {
            return Err(AppError::Validation(i18n::t("validation.content_text_required")));
        }
        if comment.commenter_id == comment.post_author_id {
            return Ok(ContentEventOutcome { notified: 0 });
        }

        let name = match self.members.member(&comment.commenter_id).await {
            Ok(Some(member)) => member.display_name,
            Ok(None) => comment.commenter_id.clone(),
            Err(e) => {
                tracing::warn!("Failed to look up member {}: {:?}", comment.commenter_id, e);
                comment.commenter_id.clone()
            }
        };
        let body = excerpt(&comment.text);

        let delivered = self
            .hub
            .notify_best_effort(CreateNotification {
                receiver_id: comment.post_author_id.clone(),
                actor_id: Some(comment.commenter_id.clone()),
                notification_type: NotificationType::Comment,
                target: Some(NotificationTarget::new("POST", &comment.post_id)),
                title: i18n::t_with("messages.comment.title", &[("name", name.as_str())]),
                message: i18n::t_with("messages.comment.body", &[("excerpt", body.as_str())]),
                link: Some(format!(
                    "/posts/{}#comment-{}",
                    comment.post_id, comment.comment_id
                )),
            })
            .await;

        Ok(ContentEventOutcome {
            notified: usize::from(delivered.is_some()),
        })
    }
}
