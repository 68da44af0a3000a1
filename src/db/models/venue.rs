use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a venue can be booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueKind {
    Hospital,
    Hotel,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub kind: VenueKind,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// A clinic doctor; the unit of exclusivity for appointment slots.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub venue_id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// Read-only view of a member from the external member directory.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub created_at: NaiveDateTime,
}
