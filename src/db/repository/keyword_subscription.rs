use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateKeywordSubscription, KeywordSubscription};
use crate::error::{AppError, AppResult};

pub struct KeywordSubscriptionRepository;

impl KeywordSubscriptionRepository {
    /// Insert a subscription. A duplicate (member, keyword, scope) surfaces as
    /// a unique violation from the store.
    pub async fn create(
        pool: &SqlitePool,
        subscription: CreateKeywordSubscription,
    ) -> AppResult<KeywordSubscription> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, KeywordSubscription>(
            r#"
            INSERT INTO keyword_subscriptions (id, member_id, keyword, scope, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, member_id, keyword, scope, created_at
            "#,
        )
        .bind(id)
        .bind(subscription.member_id)
        .bind(subscription.keyword)
        .bind(subscription.scope)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_member(
        pool: &SqlitePool,
        member_id: &str,
    ) -> AppResult<Vec<KeywordSubscription>> {
        sqlx::query_as::<_, KeywordSubscription>(
            r#"
            SELECT id, member_id, keyword, scope, created_at
            FROM keyword_subscriptions
            WHERE member_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Subscriptions that apply to content of `category`: global ones plus
    /// those scoped to exactly that category.
    pub async fn find_applicable(
        pool: &SqlitePool,
        category: Option<&str>,
    ) -> AppResult<Vec<KeywordSubscription>> {
        sqlx::query_as::<_, KeywordSubscription>(
            r#"
            SELECT id, member_id, keyword, scope, created_at
            FROM keyword_subscriptions
            WHERE scope IS NULL OR scope = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(category)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn delete_owned(pool: &SqlitePool, id: &str, member_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM keyword_subscriptions WHERE id = ? AND member_id = ?")
            .bind(id)
            .bind(member_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
