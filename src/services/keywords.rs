use std::sync::Arc;

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::db::{
    CreateKeywordSubscription, CreateNotification, KeywordSubscription,
    KeywordSubscriptionRepository, NotificationTarget, NotificationType,
};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::content::excerpt;
use crate::services::notifications::NotificationHub;
use crate::AppState;

pub const MAX_KEYWORD_CHARS: usize = 50;

/// A newly created post, as reported by the board service.
#[derive(Debug, Clone, Deserialize)]
pub struct PostCreated {
    pub post_id: String,
    pub author_id: String,
    pub category: Option<String>,
    pub text: String,
}

/// Keyword subscriptions and matching of new content against them.
pub struct KeywordMatcher {
    pool: SqlitePool,
    hub: NotificationHub,
}

impl KeywordMatcher {
    pub fn new(pool: SqlitePool, hub: NotificationHub) -> Self {
        Self { pool, hub }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(state.db.clone(), NotificationHub::from_state(state))
    }

    /// Subscribe `member_id` to `keyword`, optionally within one category.
    pub async fn subscribe(
        &self,
        member_id: &str,
        keyword: &str,
        scope: Option<&str>,
    ) -> AppResult<KeywordSubscription> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::Validation(i18n::t("validation.keyword_required")));
        }
        if keyword.chars().count() > MAX_KEYWORD_CHARS {
            return Err(AppError::Validation(i18n::t_with(
                "validation.keyword_too_long",
                &[("max", MAX_KEYWORD_CHARS.to_string().as_str())],
            )));
        }
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());

        let created = KeywordSubscriptionRepository::create(
            &self.pool,
            CreateKeywordSubscription {
                member_id: member_id.to_string(),
                keyword: keyword.to_string(),
                scope: scope.map(str::to_string),
            },
        )
        .await;

        match created {
            Ok(subscription) => {
                tracing::info!(
                    "Member {} subscribed to keyword '{}' (scope {:?})",
                    member_id,
                    subscription.keyword,
                    subscription.scope
                );
                Ok(subscription)
            }
            Err(e) if e.is_unique_violation() => Err(AppError::Conflict(i18n::t(
                "conflict.keyword_subscription_exists",
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, member_id: &str) -> AppResult<Vec<KeywordSubscription>> {
        KeywordSubscriptionRepository::find_by_member(&self.pool, member_id).await
    }

    pub async fn unsubscribe(&self, member_id: &str, subscription_id: &str) -> AppResult<()> {
        if KeywordSubscriptionRepository::delete_owned(&self.pool, subscription_id, member_id)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::NotFound(i18n::t("not_found.keyword_subscription")))
        }
    }

    /// Notify every subscriber whose keyword occurs in the post.
    ///
    /// Matching is a case-sensitive substring test. Subscriptions scoped to
    /// another category are ignored and the author is never notified. Each
    /// matching subscription yields one notification. Returns how many were
    /// delivered.
    pub async fn on_content_created(&self, post: &PostCreated) -> AppResult<usize> {
        let subscriptions =
            KeywordSubscriptionRepository::find_applicable(&self.pool, post.category.as_deref())
                .await?;

        let body = excerpt(&post.text);
        let mut notified = 0;
        for subscription in subscriptions
            .iter()
            .filter(|s| s.member_id != post.author_id)
            .filter(|s| post.text.contains(&s.keyword))
        {
            let delivered = self
                .hub
                .notify_best_effort(CreateNotification {
                    receiver_id: subscription.member_id.clone(),
                    actor_id: Some(post.author_id.clone()),
                    notification_type: NotificationType::KeywordMatch,
                    target: Some(NotificationTarget::new("POST", &post.post_id)),
                    title: i18n::t_with(
                        "messages.keyword_match.title",
                        &[("keyword", subscription.keyword.as_str())],
                    ),
                    message: i18n::t_with("messages.keyword_match.body", &[("excerpt", body.as_str())]),
                    link: Some(format!("/posts/{}", post.post_id)),
                })
                .await;
            if delivered.is_some() {
                notified += 1;
            }
        }

        tracing::debug!(
            "Post {} matched {} keyword subscription(s) of {} applicable",
            post.post_id,
            notified,
            subscriptions.len()
        );
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn post(author: &str, category: Option<&str>, text: &str) -> PostCreated {
        PostCreated {
            post_id: "post-1".to_string(),
            author_id: author.to_string(),
            category: category.map(str::to_string),
            text: text.to_string(),
        }
    }

    async fn received(state: &Arc<AppState>, member: &str) -> i64 {
        NotificationHub::from_state(state)
            .count_unread(member)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn vaccine_post_notifies_matching_subscribers_but_not_the_author() {
        let state = test_support::state().await;
        let matcher = KeywordMatcher::from_state(&state);
        matcher.subscribe("alice", "vaccine", None).await.unwrap();
        matcher.subscribe("bob", "vaccine", Some("health")).await.unwrap();
        matcher.subscribe("carol", "vaccine", Some("market")).await.unwrap();
        matcher.subscribe("dave", "Vaccine", None).await.unwrap();
        matcher.subscribe("erin", "vaccine", None).await.unwrap();

        let notified = matcher
            .on_content_created(&post(
                "erin",
                Some("health"),
                "Where can I get a rabies vaccine for my puppy?",
            ))
            .await
            .unwrap();
        assert_eq!(notified, 2);

        assert_eq!(received(&state, "alice").await, 1);
        assert_eq!(received(&state, "bob").await, 1);
        // Scoped to another category.
        assert_eq!(received(&state, "carol").await, 0);
        // Case-sensitive.
        assert_eq!(received(&state, "dave").await, 0);
        // Author.
        assert_eq!(received(&state, "erin").await, 0);

        let n = &NotificationHub::from_state(&state)
            .list_for("alice", false, 1, 10)
            .await
            .unwrap()
            .items[0];
        assert_eq!(n.notification_type, NotificationType::KeywordMatch);
        assert_eq!(n.actor_id.as_deref(), Some("erin"));
        assert_eq!(n.target_id.as_deref(), Some("post-1"));
        assert!(n.title.contains("vaccine"));
    }

    #[tokio::test]
    async fn each_matching_subscription_yields_a_notification() {
        let state = test_support::state().await;
        let matcher = KeywordMatcher::from_state(&state);
        matcher.subscribe("alice", "vacc", None).await.unwrap();
        matcher.subscribe("alice", "vaccine", None).await.unwrap();

        let notified = matcher
            .on_content_created(&post("bob", None, "vaccine day"))
            .await
            .unwrap();
        assert_eq!(notified, 2);
        assert_eq!(received(&state, "alice").await, 2);
    }

    #[tokio::test]
    async fn duplicate_subscription_conflicts() {
        let state = test_support::state().await;
        let matcher = KeywordMatcher::from_state(&state);
        matcher.subscribe("alice", "vaccine", None).await.unwrap();

        assert!(matches!(
            matcher.subscribe("alice", " vaccine ", None).await,
            Err(AppError::Conflict(_))
        ));
        // A different scope is a different subscription.
        matcher.subscribe("alice", "vaccine", Some("health")).await.unwrap();
        assert!(matches!(
            matcher.subscribe("alice", "vaccine", Some("health")).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(matcher.list("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_blank_and_oversized_keywords() {
        let state = test_support::state().await;
        let matcher = KeywordMatcher::from_state(&state);

        assert!(matches!(
            matcher.subscribe("alice", "   ", None).await,
            Err(AppError::Validation(_))
        ));
        let long = "a".repeat(MAX_KEYWORD_CHARS + 1);
        assert!(matches!(
            matcher.subscribe("alice", &long, None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unsubscribe_only_own_subscription() {
        let state = test_support::state().await;
        let matcher = KeywordMatcher::from_state(&state);
        let sub = tokio_test::assert_ok!(matcher.subscribe("alice", "grooming", None).await);

        assert!(matches!(
            matcher.unsubscribe("bob", &sub.id).await,
            Err(AppError::NotFound(_))
        ));
        tokio_test::assert_ok!(matcher.unsubscribe("alice", &sub.id).await);
        assert!(matcher.list("alice").await.unwrap().is_empty());
        assert!(matches!(
            matcher.unsubscribe("alice", &sub.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
