use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::{HospitalReservation, HotelReservation, ReservationKind, ReservationReminder};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::directory::{MemberDirectory, SqliteDirectory};
use crate::services::reminders::ReminderScheduler;
use crate::services::reservations::{
    HospitalReservationRequest, HotelReservationRequest, Reservation, ReservationLifecycle,
};
use crate::AppState;

/// No-shows at which a member is flagged for review.
const BLACKLIST_NO_SHOWS: i64 = 3;

/// Reservation creation. Kept apart so the server can rate limit admission.
pub fn admission_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hospital", post(create_hospital))
        .route("/hotel", post(create_hotel))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hospital", get(list_hospital))
        .route("/hotel", get(list_hotel))
        .route("/:kind/:id", get(get_reservation))
        .route("/:kind/:id/cancel", post(cancel_reservation))
        .route("/:kind/:id/confirm", post(confirm_reservation))
        .route("/:kind/:id/reject", post(reject_reservation))
        .route("/:kind/:id/no-show", post(mark_no_show))
        .route("/:kind/:id/reminders", get(list_reminders))
}

pub fn members_router() -> Router<Arc<AppState>> {
    Router::new().route("/:id/no-shows", get(member_no_shows))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReservationListResponse {
    pub items: Vec<Reservation>,
}

#[derive(Debug, Serialize)]
pub struct NoShowResponse {
    pub member_id: String,
    pub no_show_count: i64,
    pub blacklist_candidate: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_hospital(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<HospitalReservationRequest>,
) -> AppResult<(StatusCode, Json<HospitalReservation>)> {
    let reservation = ReservationLifecycle::from_state(&state)
        .reserve_hospital(&user.member_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn create_hotel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<HotelReservationRequest>,
) -> AppResult<(StatusCode, Json<HotelReservation>)> {
    let reservation = ReservationLifecycle::from_state(&state)
        .reserve_hotel(&user.member_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn list_hospital(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ReservationListResponse>> {
    list_mine(&state, &user.member_id, ReservationKind::Hospital).await
}

async fn list_hotel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ReservationListResponse>> {
    list_mine(&state, &user.member_id, ReservationKind::Hotel).await
}

async fn list_mine(
    state: &Arc<AppState>,
    member_id: &str,
    kind: ReservationKind,
) -> AppResult<Json<ReservationListResponse>> {
    let items = ReservationLifecycle::from_state(state)
        .list_mine(member_id, kind)
        .await?;
    Ok(Json(ReservationListResponse { items }))
}

async fn get_reservation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Reservation>> {
    let reservation = ReservationLifecycle::from_state(&state)
        .get(kind, &id, &user.caller())
        .await?;
    Ok(Json(reservation))
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Reservation>> {
    let reservation = ReservationLifecycle::from_state(&state)
        .cancel(kind, &id, &user.caller())
        .await?;
    Ok(Json(reservation))
}

async fn confirm_reservation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Reservation>> {
    user.require_admin()?;
    let reservation = ReservationLifecycle::from_state(&state)
        .confirm(kind, &id)
        .await?;
    Ok(Json(reservation))
}

async fn reject_reservation(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Reservation>> {
    user.require_admin()?;
    let reservation = ReservationLifecycle::from_state(&state)
        .reject(kind, &id)
        .await?;
    Ok(Json(reservation))
}

async fn mark_no_show(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Reservation>> {
    user.require_admin()?;
    let reservation = ReservationLifecycle::from_state(&state)
        .mark_no_show(kind, &id)
        .await?;
    Ok(Json(reservation))
}

/// Reminder rows of a reservation (admin only). Hotel stays have none.
async fn list_reminders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(ReservationKind, String)>,
) -> AppResult<Json<Vec<ReservationReminder>>> {
    user.require_admin()?;
    let reservation = ReservationLifecycle::from_state(&state)
        .get(kind, &id, &user.caller())
        .await?;
    let reminders = match reservation {
        Reservation::Hospital(r) => {
            ReminderScheduler::from_state(&state)
                .list_for_reservation(&r.id)
                .await?
        }
        Reservation::Hotel(_) => Vec::new(),
    };
    Ok(Json(reminders))
}

async fn member_no_shows(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(member_id): Path<String>,
) -> AppResult<Json<NoShowResponse>> {
    user.require_admin()?;
    SqliteDirectory::new(state.db.clone())
        .member(&member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(crate::i18n::t("not_found.member")))?;

    let no_show_count = ReservationLifecycle::from_state(&state)
        .count_no_shows(&member_id)
        .await?;
    Ok(Json(NoShowResponse {
        member_id,
        no_show_count,
        blacklist_candidate: no_show_count >= BLACKLIST_NO_SHOWS,
    }))
}
