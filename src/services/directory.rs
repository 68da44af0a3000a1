//! Read-only views of the member directory and the venue catalog.
//!
//! Both are owned by other services; this crate only reads them.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{DirectoryRepository, Doctor, Member, Venue};
use crate::error::AppResult;

#[async_trait]
pub trait VenueCatalog: Send + Sync {
    async fn venue(&self, venue_id: &str) -> AppResult<Option<Venue>>;
    async fn doctor(&self, doctor_id: &str) -> AppResult<Option<Doctor>>;
}

#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn member(&self, member_id: &str) -> AppResult<Option<Member>>;
}

/// Directory backed by the shared SQLite tables.
#[derive(Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VenueCatalog for SqliteDirectory {
    async fn venue(&self, venue_id: &str) -> AppResult<Option<Venue>> {
        DirectoryRepository::find_venue(&self.pool, venue_id).await
    }

    async fn doctor(&self, doctor_id: &str) -> AppResult<Option<Doctor>> {
        DirectoryRepository::find_doctor(&self.pool, doctor_id).await
    }
}

#[async_trait]
impl MemberDirectory for SqliteDirectory {
    async fn member(&self, member_id: &str) -> AppResult<Option<Member>> {
        DirectoryRepository::find_member(&self.pool, member_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::VenueKind;
    use crate::test_support;

    #[tokio::test]
    async fn reads_seeded_rows() {
        let pool = test_support::pool().await;
        test_support::seed_member(&pool, "m-1", "Kim").await;
        test_support::seed_venue(&pool, "clinic-1", "Happy Vet", VenueKind::Hospital).await;
        test_support::seed_doctor(&pool, "doc-1", "clinic-1").await;

        let directory = SqliteDirectory::new(pool);
        assert_eq!(
            directory.member("m-1").await.unwrap().unwrap().display_name,
            "Kim"
        );
        let venue = directory.venue("clinic-1").await.unwrap().unwrap();
        assert_eq!(venue.kind, VenueKind::Hospital);
        assert!(venue.is_active);
        assert_eq!(
            directory.doctor("doc-1").await.unwrap().unwrap().venue_id,
            "clinic-1"
        );
        assert!(directory.member("nobody").await.unwrap().is_none());
    }
}
