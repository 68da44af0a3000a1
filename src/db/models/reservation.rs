use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Shared status of clinic and hotel reservations.
///
/// ```text
/// PENDING ──confirm──> CONFIRMED ──no-show──> NOSHOW
///    │                     │
///    ├──reject──> REJECTED └──cancel──> CANCELED
///    └──cancel──> CANCELED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Rejected,
    Canceled,
    #[serde(rename = "NOSHOW")]
    #[sqlx(rename = "NOSHOW")]
    NoShow,
}

/// Requested change of a reservation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    Confirm,
    Reject,
    Cancel,
    MarkNoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Rejected => "REJECTED",
            ReservationStatus::Canceled => "CANCELED",
            ReservationStatus::NoShow => "NOSHOW",
        }
    }

    /// Active reservations occupy their slot or count against venue capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    /// Returns the status reached by `action`, or `None` when the transition is not allowed.
    pub fn apply(self, action: ReservationAction) -> Option<ReservationStatus> {
        use ReservationAction::*;
        use ReservationStatus::*;

        match (self, action) {
            (Pending, Confirm) => Some(Confirmed),
            (Pending, Reject) => Some(Rejected),
            (Pending, Cancel) | (Confirmed, Cancel) => Some(Canceled),
            (Confirmed, MarkNoShow) => Some(NoShow),
            _ => None,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ReservationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationAction::Confirm => "confirm",
            ReservationAction::Reject => "reject",
            ReservationAction::Cancel => "cancel",
            ReservationAction::MarkNoShow => "mark no-show",
        };
        f.write_str(s)
    }
}

/// Which reservation table an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationKind {
    Hospital,
    Hotel,
}

impl ReservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationKind::Hospital => "hospital",
            ReservationKind::Hotel => "hotel",
        }
    }
}

/// Clinic appointment. `appointment_at` is always aligned to a slot boundary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HospitalReservation {
    pub id: String,
    pub venue_id: String,
    pub doctor_id: String,
    pub member_id: String,
    pub appointment_at: NaiveDateTime,
    pub status: ReservationStatus,
    pub reserver_name: String,
    pub reserver_phone: String,
    pub pet_name: String,
    pub memo: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Hotel stay over `[check_in, check_out)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HotelReservation {
    pub id: String,
    pub venue_id: String,
    pub member_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: ReservationStatus,
    pub reserver_name: String,
    pub reserver_phone: String,
    pub pet_name: String,
    pub memo: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Reserver and pet details shared by both reservation kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserverInfo {
    pub reserver_name: String,
    pub reserver_phone: String,
    pub pet_name: String,
    pub memo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewHospitalReservation {
    pub venue_id: String,
    pub doctor_id: String,
    pub member_id: String,
    pub appointment_at: NaiveDateTime,
    pub reserver: ReserverInfo,
}

#[derive(Debug, Clone)]
pub struct NewHotelReservation {
    pub venue_id: String,
    pub member_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub reserver: ReserverInfo,
}
