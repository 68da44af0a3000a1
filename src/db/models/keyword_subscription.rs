use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Standing request of a member to be notified about content containing `keyword`.
///
/// `scope` restricts matching to one content category; `None` matches every category.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KeywordSubscription {
    pub id: String,
    pub member_id: String,
    pub keyword: String,
    pub scope: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKeywordSubscription {
    pub member_id: String,
    pub keyword: String,
    pub scope: Option<String>,
}
