//! Reservation lifecycle: creation through the availability ledger and the
//! status machine PENDING → CONFIRMED / REJECTED / CANCELED → NOSHOW.
//!
//! Member notifications raised here are best effort; a failure to notify is
//! logged and never undoes the reservation change.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::BookingConfig;
use crate::db::{
    CreateNotification, HospitalReservation, HospitalReservationRepository, HotelReservation,
    HotelReservationRepository, NewHospitalReservation, NewHotelReservation, NotificationTarget,
    NotificationType, ReservationAction, ReservationKind, ReservationStatus, ReserverInfo, Venue,
    VenueKind,
};
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::availability::AvailabilityLedger;
use crate::services::directory::{SqliteDirectory, VenueCatalog};
use crate::services::notifications::NotificationHub;
use crate::services::reminders::ReminderScheduler;
use crate::AppState;

/// Who is acting on a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub member_id: String,
    pub is_admin: bool,
}

impl Caller {
    #[cfg(test)]
    pub fn member(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            is_admin: false,
        }
    }

    #[cfg(test)]
    pub fn admin(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            is_admin: true,
        }
    }

    fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin || self.member_id == owner_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HospitalReservationRequest {
    pub venue_id: String,
    pub doctor_id: String,
    pub appointment_at: NaiveDateTime,
    #[serde(flatten)]
    pub reserver: ReserverInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HotelReservationRequest {
    pub venue_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(flatten)]
    pub reserver: ReserverInfo,
}

/// A reservation of either kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reservation {
    Hospital(HospitalReservation),
    Hotel(HotelReservation),
}

impl Reservation {
    pub fn kind(&self) -> ReservationKind {
        match self {
            Reservation::Hospital(_) => ReservationKind::Hospital,
            Reservation::Hotel(_) => ReservationKind::Hotel,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Reservation::Hospital(r) => &r.id,
            Reservation::Hotel(r) => &r.id,
        }
    }

    pub fn member_id(&self) -> &str {
        match self {
            Reservation::Hospital(r) => &r.member_id,
            Reservation::Hotel(r) => &r.member_id,
        }
    }

    pub fn venue_id(&self) -> &str {
        match self {
            Reservation::Hospital(r) => &r.venue_id,
            Reservation::Hotel(r) => &r.venue_id,
        }
    }

    pub fn status(&self) -> ReservationStatus {
        match self {
            Reservation::Hospital(r) => r.status,
            Reservation::Hotel(r) => r.status,
        }
    }

    fn schedule_label(&self) -> String {
        match self {
            Reservation::Hospital(r) => r.appointment_at.format("%Y-%m-%d %H:%M").to_string(),
            Reservation::Hotel(r) => format!("{} ~ {}", r.check_in, r.check_out),
        }
    }

    fn target(&self) -> NotificationTarget {
        let target_type = match self {
            Reservation::Hospital(_) => "HOSPITAL_RESERVATION",
            Reservation::Hotel(_) => "HOTEL_RESERVATION",
        };
        NotificationTarget::new(target_type, self.id())
    }

    fn link(&self) -> String {
        format!("/reservations/{}/{}", self.kind().as_str(), self.id())
    }
}

/// Floor `at` to the start of its slot.
pub fn truncate_to_slot(at: NaiveDateTime, slot_minutes: u32) -> NaiveDateTime {
    let slot = slot_minutes.max(1);
    let minute = at.minute() - at.minute() % slot;
    at.date().and_hms_opt(at.hour(), minute, 0).unwrap_or(at)
}

fn validate_reserver(reserver: &ReserverInfo) -> AppResult<()> {
    if reserver.reserver_name.trim().is_empty() {
        return Err(AppError::Validation(i18n::t("validation.reserver_name_required")));
    }
    if reserver.reserver_phone.trim().is_empty() {
        return Err(AppError::Validation(i18n::t("validation.reserver_phone_required")));
    }
    if reserver.pet_name.trim().is_empty() {
        return Err(AppError::Validation(i18n::t("validation.pet_name_required")));
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound(i18n::t("not_found.reservation"))
}

fn invalid_transition(status: ReservationStatus, action: ReservationAction) -> AppError {
    AppError::InvalidTransition(i18n::t_with(
        "transition.not_allowed",
        &[("status", status.as_str()), ("action", action.to_string().as_str())],
    ))
}

pub struct ReservationLifecycle {
    pool: SqlitePool,
    ledger: Arc<AvailabilityLedger>,
    catalog: Arc<dyn VenueCatalog>,
    hub: NotificationHub,
    reminders: ReminderScheduler,
    booking: BookingConfig,
}

impl ReservationLifecycle {
    pub fn new(
        pool: SqlitePool,
        ledger: Arc<AvailabilityLedger>,
        catalog: Arc<dyn VenueCatalog>,
        hub: NotificationHub,
        reminders: ReminderScheduler,
        booking: BookingConfig,
    ) -> Self {
        Self {
            pool,
            ledger,
            catalog,
            hub,
            reminders,
            booking,
        }
    }

    pub fn from_state(state: &Arc<AppState>) -> Self {
        Self::new(
            state.db.clone(),
            state.ledger.clone(),
            Arc::new(SqliteDirectory::new(state.db.clone())),
            NotificationHub::from_state(state),
            ReminderScheduler::from_state(state),
            state.config.booking.clone(),
        )
    }

    async fn bookable_venue(&self, venue_id: &str, kind: VenueKind) -> AppResult<Venue> {
        let venue = self
            .catalog
            .venue(venue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(i18n::t("not_found.venue")))?;

        if venue.kind != kind {
            let key = match kind {
                VenueKind::Hospital => "validation.venue_not_hospital",
                VenueKind::Hotel => "validation.venue_not_hotel",
            };
            return Err(AppError::Validation(i18n::t(key)));
        }
        if !venue.is_active {
            return Err(AppError::Validation(i18n::t("validation.venue_inactive")));
        }
        Ok(venue)
    }

    /// Book a clinic slot. The appointment time is floored to its slot.
    pub async fn reserve_hospital(
        &self,
        member_id: &str,
        req: HospitalReservationRequest,
    ) -> AppResult<HospitalReservation> {
        validate_reserver(&req.reserver)?;
        let venue = self.bookable_venue(&req.venue_id, VenueKind::Hospital).await?;

        let doctor = self
            .catalog
            .doctor(&req.doctor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(i18n::t("not_found.doctor")))?;
        if !doctor.is_active || doctor.venue_id != venue.id {
            return Err(AppError::Validation(i18n::t("validation.doctor_unavailable")));
        }

        let now = Utc::now().naive_utc();
        let appointment_at = truncate_to_slot(req.appointment_at, self.booking.slot_minutes);
        if appointment_at <= now {
            return Err(AppError::Validation(i18n::t("validation.appointment_in_past")));
        }

        let reservation = self
            .ledger
            .try_admit_exclusive_slot(
                &self.pool,
                &NewHospitalReservation {
                    venue_id: venue.id.clone(),
                    doctor_id: doctor.id.clone(),
                    member_id: member_id.to_string(),
                    appointment_at,
                    reserver: req.reserver,
                },
            )
            .await??;

        // Confirmation re-runs this, so a failure here is healed later.
        if let Err(e) = self
            .reminders
            .schedule_for_appointment(&reservation.id, member_id, appointment_at, now)
            .await
        {
            tracing::warn!(
                "Failed to schedule reminders for reservation {}: {:?}",
                reservation.id,
                e
            );
        }

        let time = reservation.appointment_at.format("%Y-%m-%d %H:%M").to_string();
        let message = i18n::t_with(
            "messages.reservation_accepted.hospital_body",
            &[("venue", venue.name.as_str()), ("time", time.as_str())],
        );
        self.notify(
            &Reservation::Hospital(reservation.clone()),
            NotificationType::ReservationAccepted,
            i18n::t("messages.reservation_accepted.title"),
            message,
            None,
        )
        .await;

        Ok(reservation)
    }

    /// Book a hotel stay over `[check_in, check_out)` within the venue capacity.
    pub async fn reserve_hotel(
        &self,
        member_id: &str,
        req: HotelReservationRequest,
    ) -> AppResult<HotelReservation> {
        validate_reserver(&req.reserver)?;
        if req.check_out <= req.check_in {
            return Err(AppError::Validation(i18n::t(
                "validation.check_out_not_after_check_in",
            )));
        }
        if req.check_in < Utc::now().date_naive() {
            return Err(AppError::Validation(i18n::t("validation.check_in_in_past")));
        }
        let venue = self.bookable_venue(&req.venue_id, VenueKind::Hotel).await?;

        let reservation = self
            .ledger
            .try_admit_range_capacity(
                &self.pool,
                &NewHotelReservation {
                    venue_id: venue.id.clone(),
                    member_id: member_id.to_string(),
                    check_in: req.check_in,
                    check_out: req.check_out,
                    reserver: req.reserver,
                },
                self.booking.hotel_capacity,
            )
            .await??;

        let message = i18n::t_with(
            "messages.reservation_accepted.hotel_body",
            &[
                ("venue", venue.name.as_str()),
                ("check_in", reservation.check_in.to_string().as_str()),
                ("check_out", reservation.check_out.to_string().as_str()),
            ],
        );
        self.notify(
            &Reservation::Hotel(reservation.clone()),
            NotificationType::ReservationAccepted,
            i18n::t("messages.reservation_accepted.title"),
            message,
            None,
        )
        .await;

        Ok(reservation)
    }

    pub async fn confirm(&self, kind: ReservationKind, id: &str) -> AppResult<Reservation> {
        let current = self.load(kind, id).await?;
        let confirmed = self.apply(&current, ReservationAction::Confirm).await?;

        if let Reservation::Hospital(r) = &confirmed {
            let now = Utc::now().naive_utc();
            if let Err(e) = self
                .reminders
                .schedule_for_appointment(&r.id, &r.member_id, r.appointment_at, now)
                .await
            {
                tracing::warn!("Failed to schedule reminders for reservation {}: {:?}", r.id, e);
            }
        }

        self.notify_status(&confirmed, NotificationType::ReservationConfirmed, None)
            .await;
        Ok(confirmed)
    }

    pub async fn reject(&self, kind: ReservationKind, id: &str) -> AppResult<Reservation> {
        let current = self.load(kind, id).await?;
        let rejected = self.apply(&current, ReservationAction::Reject).await?;
        self.cancel_reminders(&rejected).await?;
        self.notify_status(&rejected, NotificationType::ReservationRejected, None)
            .await;
        Ok(rejected)
    }

    /// Cancel as the owner or an admin. The member is notified only when
    /// someone else canceled on their behalf.
    pub async fn cancel(
        &self,
        kind: ReservationKind,
        id: &str,
        caller: &Caller,
    ) -> AppResult<Reservation> {
        let current = self.load(kind, id).await?;
        if !caller.can_access(current.member_id()) {
            return Err(not_found());
        }

        let canceled = self.apply(&current, ReservationAction::Cancel).await?;
        self.cancel_reminders(&canceled).await?;

        if caller.member_id != canceled.member_id() {
            self.notify_status(
                &canceled,
                NotificationType::ReservationCanceled,
                Some(&caller.member_id),
            )
            .await;
        }
        Ok(canceled)
    }

    /// Mark a confirmed reservation as a no-show once its time has passed.
    pub async fn mark_no_show(&self, kind: ReservationKind, id: &str) -> AppResult<Reservation> {
        let current = self.load(kind, id).await?;
        if current.status().apply(ReservationAction::MarkNoShow).is_none() {
            return Err(invalid_transition(
                current.status(),
                ReservationAction::MarkNoShow,
            ));
        }

        let now = Utc::now().naive_utc();
        let started = match &current {
            Reservation::Hospital(r) => r.appointment_at <= now,
            Reservation::Hotel(r) => r.check_in <= now.date(),
        };
        if !started {
            return Err(AppError::InvalidTransition(i18n::t(
                "transition.no_show_too_early",
            )));
        }

        let marked = self.apply(&current, ReservationAction::MarkNoShow).await?;
        tracing::info!(
            "Member {} marked as no-show for {} reservation {}",
            marked.member_id(),
            marked.kind().as_str(),
            marked.id()
        );
        Ok(marked)
    }

    /// No-shows of a member across both reservation kinds.
    pub async fn count_no_shows(&self, member_id: &str) -> AppResult<i64> {
        let hospital = HospitalReservationRepository::count_by_member_and_status(
            &self.pool,
            member_id,
            ReservationStatus::NoShow,
        )
        .await?;
        let hotel = HotelReservationRepository::count_by_member_and_status(
            &self.pool,
            member_id,
            ReservationStatus::NoShow,
        )
        .await?;
        Ok(hospital + hotel)
    }

    pub async fn get(
        &self,
        kind: ReservationKind,
        id: &str,
        caller: &Caller,
    ) -> AppResult<Reservation> {
        let reservation = self.load(kind, id).await?;
        if !caller.can_access(reservation.member_id()) {
            return Err(not_found());
        }
        Ok(reservation)
    }

    pub async fn list_mine(
        &self,
        member_id: &str,
        kind: ReservationKind,
    ) -> AppResult<Vec<Reservation>> {
        let reservations = match kind {
            ReservationKind::Hospital => {
                HospitalReservationRepository::find_by_member(&self.pool, member_id)
                    .await?
                    .into_iter()
                    .map(Reservation::Hospital)
                    .collect()
            }
            ReservationKind::Hotel => HotelReservationRepository::find_by_member(&self.pool, member_id)
                .await?
                .into_iter()
                .map(Reservation::Hotel)
                .collect(),
        };
        Ok(reservations)
    }

    async fn load(&self, kind: ReservationKind, id: &str) -> AppResult<Reservation> {
        let found = match kind {
            ReservationKind::Hospital => HospitalReservationRepository::find_by_id(&self.pool, id)
                .await?
                .map(Reservation::Hospital),
            ReservationKind::Hotel => HotelReservationRepository::find_by_id(&self.pool, id)
                .await?
                .map(Reservation::Hotel),
        };
        found.ok_or_else(not_found)
    }

    /// Compare-and-set the status reached by `action` from the loaded status.
    ///
    /// A concurrent change between load and update is reported as an invalid
    /// transition from the status that won.
    async fn apply(&self, current: &Reservation, action: ReservationAction) -> AppResult<Reservation> {
        let from = current.status();
        let to = from
            .apply(action)
            .ok_or_else(|| invalid_transition(from, action))?;

        let updated = match current {
            Reservation::Hospital(r) => {
                HospitalReservationRepository::update_status(&self.pool, &r.id, from, to)
                    .await?
                    .map(Reservation::Hospital)
            }
            Reservation::Hotel(r) => {
                HotelReservationRepository::update_status(&self.pool, &r.id, from, to)
                    .await?
                    .map(Reservation::Hotel)
            }
        };

        match updated {
            Some(reservation) => {
                tracing::info!(
                    "{} reservation {}: {} -> {}",
                    reservation.kind().as_str(),
                    reservation.id(),
                    from,
                    to
                );
                Ok(reservation)
            }
            None => {
                let latest = self.load(current.kind(), current.id()).await?;
                Err(invalid_transition(latest.status(), action))
            }
        }
    }

    async fn cancel_reminders(&self, reservation: &Reservation) -> AppResult<()> {
        if reservation.kind() != ReservationKind::Hospital {
            return Ok(());
        }
        self.reminders
            .cancel_all_pending(reservation.id())
            .await
            .map_err(|e| {
                tracing::error!(
                    "Failed to cancel reminders of reservation {}: {:?}",
                    reservation.id(),
                    e
                );
                e
            })?;
        Ok(())
    }

    async fn venue_name(&self, venue_id: &str) -> String {
        match self.catalog.venue(venue_id).await {
            Ok(Some(venue)) => venue.name,
            Ok(None) => venue_id.to_string(),
            Err(e) => {
                tracing::warn!("Failed to load venue {}: {:?}", venue_id, e);
                venue_id.to_string()
            }
        }
    }

    async fn notify_status(
        &self,
        reservation: &Reservation,
        notification_type: NotificationType,
        actor_id: Option<&str>,
    ) {
        let prefix = match notification_type {
            NotificationType::ReservationConfirmed => "messages.reservation_confirmed",
            NotificationType::ReservationRejected => "messages.reservation_rejected",
            _ => "messages.reservation_canceled",
        };
        let venue = self.venue_name(reservation.venue_id()).await;
        let schedule = reservation.schedule_label();

        self.notify(
            reservation,
            notification_type,
            i18n::t(&format!("{prefix}.title")),
            i18n::t_with(
                &format!("{prefix}.body"),
                &[("venue", venue.as_str()), ("schedule", schedule.as_str())],
            ),
            actor_id,
        )
        .await;
    }

    async fn notify(
        &self,
        reservation: &Reservation,
        notification_type: NotificationType,
        title: String,
        message: String,
        actor_id: Option<&str>,
    ) {
        self.hub
            .notify_best_effort(CreateNotification {
                receiver_id: reservation.member_id().to_string(),
                actor_id: actor_id.map(str::to_string),
                notification_type,
                target: Some(reservation.target()),
                title,
                message,
                link: Some(reservation.link()),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveTime};

    use super::*;
    use crate::db::{ReminderKind, ReminderStatus};
    use crate::services::availability::AdmissionConflict;
    use crate::test_support;

    struct Fixture {
        state: Arc<AppState>,
        lifecycle: ReservationLifecycle,
    }

    async fn fixture() -> Fixture {
        let state = test_support::state().await;
        test_support::seed_member(&state.db, "m-1", "Kim").await;
        test_support::seed_member(&state.db, "m-2", "Lee").await;
        test_support::seed_venue(&state.db, "clinic-1", "Happy Vet", VenueKind::Hospital).await;
        test_support::seed_venue(&state.db, "clinic-2", "Other Vet", VenueKind::Hospital).await;
        test_support::seed_doctor(&state.db, "doc-7", "clinic-1").await;
        test_support::seed_doctor(&state.db, "doc-9", "clinic-2").await;
        test_support::seed_venue(&state.db, "hotel-1", "Paw Hotel", VenueKind::Hotel).await;
        let lifecycle = ReservationLifecycle::from_state(&state);
        Fixture { state, lifecycle }
    }

    fn days_ahead(days: i64) -> NaiveDate {
        (Utc::now() + Duration::days(days)).date_naive()
    }

    fn clinic_request(doctor: &str, at: NaiveDateTime) -> HospitalReservationRequest {
        HospitalReservationRequest {
            venue_id: "clinic-1".to_string(),
            doctor_id: doctor.to_string(),
            appointment_at: at,
            reserver: test_support::reserver(),
        }
    }

    fn hotel_request(check_in: NaiveDate, check_out: NaiveDate) -> HotelReservationRequest {
        HotelReservationRequest {
            venue_id: "hotel-1".to_string(),
            check_in,
            check_out,
            reserver: test_support::reserver(),
        }
    }

    fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        day.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    async fn notification_types(state: &Arc<AppState>, member: &str) -> Vec<NotificationType> {
        NotificationHub::from_state(state)
            .list_for(member, false, 1, 100)
            .await
            .unwrap()
            .items
            .into_iter()
            .map(|n| n.notification_type)
            .collect()
    }

    #[test]
    fn truncates_to_slot_start() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let raw = day.and_hms_milli_opt(10, 47, 12, 500).unwrap();
        assert_eq!(truncate_to_slot(raw, 30), at(day, 10, 30));
        assert_eq!(truncate_to_slot(at(day, 10, 0), 30), at(day, 10, 0));
        assert_eq!(truncate_to_slot(at(day, 10, 29), 30), at(day, 10, 0));
    }

    #[tokio::test]
    async fn hospital_reservation_is_pending_with_reminders_and_notification() {
        let f = fixture().await;
        let day = days_ahead(3);

        let r = f
            .lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(day, 10, 47)))
            .await
            .unwrap();
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.appointment_at, at(day, 10, 30));

        let reminders = ReminderScheduler::from_state(&f.state)
            .list_for_reservation(&r.id)
            .await
            .unwrap();
        let kinds: Vec<_> = reminders.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ReminderKind::Remind24h, ReminderKind::Remind3h]);
        assert_eq!(reminders[1].fire_at, at(day, 7, 30));

        assert_eq!(
            notification_types(&f.state, "m-1").await,
            vec![NotificationType::ReservationAccepted]
        );
    }

    #[tokio::test]
    async fn same_slot_after_truncation_conflicts() {
        let f = fixture().await;
        let day = days_ahead(3);

        f.lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(day, 10, 0)))
            .await
            .unwrap();
        let err = f
            .lifecycle
            .reserve_hospital("m-2", clinic_request("doc-7", at(day, 10, 20)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Admission(AdmissionConflict::SlotConflict { .. })
        ));
        assert!(f.lifecycle.list_mine("m-2", ReservationKind::Hospital).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_happens_before_admission() {
        let f = fixture().await;
        let day = days_ahead(3);

        let mut blank_pet = clinic_request("doc-7", at(day, 11, 0));
        blank_pet.reserver.pet_name = "  ".to_string();
        assert!(matches!(
            f.lifecycle.reserve_hospital("m-1", blank_pet).await,
            Err(AppError::Validation(_))
        ));

        let past = clinic_request("doc-7", Utc::now().naive_utc() - Duration::hours(1));
        assert!(matches!(
            f.lifecycle.reserve_hospital("m-1", past).await,
            Err(AppError::Validation(_))
        ));

        // Doctor works at another clinic.
        assert!(matches!(
            f.lifecycle
                .reserve_hospital("m-1", clinic_request("doc-9", at(day, 11, 0)))
                .await,
            Err(AppError::Validation(_))
        ));

        let mut wrong_kind = clinic_request("doc-7", at(day, 11, 0));
        wrong_kind.venue_id = "hotel-1".to_string();
        assert!(matches!(
            f.lifecycle.reserve_hospital("m-1", wrong_kind).await,
            Err(AppError::Validation(_))
        ));

        let mut unknown = clinic_request("doc-7", at(day, 11, 0));
        unknown.venue_id = "nowhere".to_string();
        assert!(matches!(
            f.lifecycle.reserve_hospital("m-1", unknown).await,
            Err(AppError::NotFound(_))
        ));

        assert!(f.lifecycle.list_mine("m-1", ReservationKind::Hospital).await.unwrap().is_empty());

        // Nothing was admitted, so the slot is still free.
        f.lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(day, 11, 0)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hotel_validation_and_capacity() {
        let mut f = fixture().await;
        f.lifecycle.booking.hotel_capacity = 2;

        let same_day = hotel_request(days_ahead(5), days_ahead(5));
        assert!(matches!(
            f.lifecycle.reserve_hotel("m-1", same_day).await,
            Err(AppError::Validation(_))
        ));
        let past = hotel_request(days_ahead(-2), days_ahead(1));
        assert!(matches!(
            f.lifecycle.reserve_hotel("m-1", past).await,
            Err(AppError::Validation(_))
        ));

        for member in ["m-1", "m-2"] {
            f.lifecycle
                .reserve_hotel(member, hotel_request(days_ahead(5), days_ahead(7)))
                .await
                .unwrap();
        }
        let err = f
            .lifecycle
            .reserve_hotel("m-1", hotel_request(days_ahead(6), days_ahead(8)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Admission(AdmissionConflict::CapacityExceeded { capacity: 2, .. })
        ));

        f.lifecycle
            .reserve_hotel("m-1", hotel_request(days_ahead(10), days_ahead(12)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirm_notifies_and_rejects_repeats() {
        let f = fixture().await;
        let r = f
            .lifecycle
            .reserve_hotel("m-1", hotel_request(days_ahead(5), days_ahead(7)))
            .await
            .unwrap();

        let confirmed = f.lifecycle.confirm(ReservationKind::Hotel, &r.id).await.unwrap();
        assert_eq!(confirmed.status(), ReservationStatus::Confirmed);
        assert!(matches!(
            f.lifecycle.confirm(ReservationKind::Hotel, &r.id).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.lifecycle.reject(ReservationKind::Hotel, &r.id).await,
            Err(AppError::InvalidTransition(_))
        ));

        let types = notification_types(&f.state, "m-1").await;
        assert_eq!(
            types,
            vec![
                NotificationType::ReservationConfirmed,
                NotificationType::ReservationAccepted
            ]
        );
    }

    #[tokio::test]
    async fn reject_cancels_reminders_and_frees_the_slot() {
        let f = fixture().await;
        let slot = at(days_ahead(3), 14, 0);
        let r = f
            .lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", slot))
            .await
            .unwrap();

        f.lifecycle.reject(ReservationKind::Hospital, &r.id).await.unwrap();

        let reminders = ReminderScheduler::from_state(&f.state)
            .list_for_reservation(&r.id)
            .await
            .unwrap();
        assert!(reminders.iter().all(|r| r.status == ReminderStatus::Cancelled));
        assert!(notification_types(&f.state, "m-1")
            .await
            .contains(&NotificationType::ReservationRejected));

        f.lifecycle
            .reserve_hospital("m-2", clinic_request("doc-7", slot))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_respects_ownership_and_notifies_only_on_behalf() {
        let f = fixture().await;
        let own = f
            .lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(days_ahead(3), 9, 0)))
            .await
            .unwrap();

        assert!(matches!(
            f.lifecycle
                .cancel(ReservationKind::Hospital, &own.id, &Caller::member("m-2"))
                .await,
            Err(AppError::NotFound(_))
        ));

        let canceled = f
            .lifecycle
            .cancel(ReservationKind::Hospital, &own.id, &Caller::member("m-1"))
            .await
            .unwrap();
        assert_eq!(canceled.status(), ReservationStatus::Canceled);
        assert!(!notification_types(&f.state, "m-1")
            .await
            .contains(&NotificationType::ReservationCanceled));
        assert!(matches!(
            f.lifecycle
                .cancel(ReservationKind::Hospital, &own.id, &Caller::member("m-1"))
                .await,
            Err(AppError::InvalidTransition(_))
        ));

        let other = f
            .lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(days_ahead(3), 9, 30)))
            .await
            .unwrap();
        f.lifecycle.confirm(ReservationKind::Hospital, &other.id).await.unwrap();
        f.lifecycle
            .cancel(ReservationKind::Hospital, &other.id, &Caller::admin("admin-1"))
            .await
            .unwrap();
        let reminders = ReminderScheduler::from_state(&f.state)
            .list_for_reservation(&other.id)
            .await
            .unwrap();
        assert_eq!(reminders.len(), 2);
        assert!(reminders.iter().all(|r| r.status == ReminderStatus::Cancelled));

        let canceled_notes: Vec<_> = NotificationHub::from_state(&f.state)
            .list_for("m-1", false, 1, 100)
            .await
            .unwrap()
            .items
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::ReservationCanceled)
            .collect();
        assert_eq!(canceled_notes.len(), 1);
        assert_eq!(canceled_notes[0].actor_id.as_deref(), Some("admin-1"));
        assert_eq!(canceled_notes[0].target_id.as_deref(), Some(other.id.as_str()));
    }

    #[tokio::test]
    async fn no_show_only_after_start_of_a_confirmed_reservation() {
        let f = fixture().await;

        // Future confirmed appointment: too early.
        let future = f
            .lifecycle
            .reserve_hospital("m-1", clinic_request("doc-7", at(days_ahead(2), 10, 0)))
            .await
            .unwrap();
        f.lifecycle.confirm(ReservationKind::Hospital, &future.id).await.unwrap();
        assert!(matches!(
            f.lifecycle.mark_no_show(ReservationKind::Hospital, &future.id).await,
            Err(AppError::InvalidTransition(_))
        ));

        // Past appointments are only reachable by inserting directly.
        let past = HospitalReservationRepository::insert(
            &f.state.db,
            &NewHospitalReservation {
                venue_id: "clinic-1".to_string(),
                doctor_id: "doc-7".to_string(),
                member_id: "m-1".to_string(),
                appointment_at: at(days_ahead(-1), 10, 0),
                reserver: test_support::reserver(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            f.lifecycle.mark_no_show(ReservationKind::Hospital, &past.id).await,
            Err(AppError::InvalidTransition(_))
        ));
        f.lifecycle.confirm(ReservationKind::Hospital, &past.id).await.unwrap();
        let marked = f
            .lifecycle
            .mark_no_show(ReservationKind::Hospital, &past.id)
            .await
            .unwrap();
        assert_eq!(marked.status(), ReservationStatus::NoShow);

        let stay = HotelReservationRepository::insert(
            &f.state.db,
            &NewHotelReservation {
                venue_id: "hotel-1".to_string(),
                member_id: "m-1".to_string(),
                check_in: days_ahead(0),
                check_out: days_ahead(2),
                reserver: test_support::reserver(),
            },
        )
        .await
        .unwrap();
        f.lifecycle.confirm(ReservationKind::Hotel, &stay.id).await.unwrap();
        f.lifecycle.mark_no_show(ReservationKind::Hotel, &stay.id).await.unwrap();

        assert_eq!(f.lifecycle.count_no_shows("m-1").await.unwrap(), 2);
        assert_eq!(f.lifecycle.count_no_shows("m-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_hides_foreign_reservations() {
        let f = fixture().await;
        let r = f
            .lifecycle
            .reserve_hotel("m-1", hotel_request(days_ahead(4), days_ahead(5)))
            .await
            .unwrap();

        let own = f
            .lifecycle
            .get(ReservationKind::Hotel, &r.id, &Caller::member("m-1"))
            .await
            .unwrap();
        assert_eq!(own.id(), r.id);
        assert!(matches!(
            f.lifecycle
                .get(ReservationKind::Hotel, &r.id, &Caller::member("m-2"))
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(f
            .lifecycle
            .get(ReservationKind::Hotel, &r.id, &Caller::admin("admin-1"))
            .await
            .is_ok());
        // Wrong kind looks like a missing id.
        assert!(matches!(
            f.lifecycle
                .get(ReservationKind::Hospital, &r.id, &Caller::member("m-1"))
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bookings_of_one_slot_admit_one() {
        let f = fixture().await;
        let lifecycle = Arc::new(f.lifecycle);
        let slot = at(days_ahead(4), 16, 0);

        let mut handles = Vec::new();
        for member in ["m-1", "m-2", "m-1", "m-2", "m-1", "m-2"] {
            let lifecycle = lifecycle.clone();
            handles.push(tokio::spawn(async move {
                lifecycle
                    .reserve_hospital(member, clinic_request("doc-7", slot))
                    .await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(AppError::Admission(AdmissionConflict::SlotConflict { .. })) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(granted, 1);
    }
}
