use sqlx::SqlitePool;

use crate::db::models::{Doctor, Member, Venue};
use crate::error::{AppError, AppResult};

// ============================================================================
// Directory Repository (members, venues, doctors)
// ============================================================================

pub struct DirectoryRepository;

impl DirectoryRepository {
    pub async fn find_venue(pool: &SqlitePool, id: &str) -> AppResult<Option<Venue>> {
        sqlx::query_as::<_, Venue>(
            r#"
            SELECT id, name, address, latitude, longitude, kind, is_active, created_at
            FROM venues
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_doctor(pool: &SqlitePool, id: &str) -> AppResult<Option<Doctor>> {
        sqlx::query_as::<_, Doctor>(
            r#"
            SELECT id, venue_id, name, is_active, created_at
            FROM doctors
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_member(pool: &SqlitePool, id: &str) -> AppResult<Option<Member>> {
        sqlx::query_as::<_, Member>(
            r#"
            SELECT id, display_name, created_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }
}
