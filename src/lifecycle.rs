//! Reservation status transitions and their side effects.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::Principal,
    calendar,
    db::fetch_reservation,
    error::BookingError,
    models::{Reservation, ReservationRow, ReservationStatus, ROLE_DOCTOR, ROLE_USER},
    profiles,
};

use ReservationStatus::*;

/// Who is acting on a reservation, relative to that reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Owner,
    AssignedDoctor,
}

impl Actor {
    pub fn resolve(reservation: &ReservationRow, principal: &Principal) -> Result<Actor, BookingError> {
        if principal.is_doctor() && principal.id == reservation.doctor_id {
            Ok(Actor::AssignedDoctor)
        } else if principal.id == reservation.user_id {
            Ok(Actor::Owner)
        } else {
            Err(BookingError::NotAuthorized)
        }
    }

    fn role(self) -> &'static str {
        match self {
            Actor::Owner => ROLE_USER,
            Actor::AssignedDoctor => ROLE_DOCTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    ReleaseSlot,
    RecordCompletion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: ReservationStatus,
    pub reason: Option<String>,
}

// A doctor may jump straight from pending to completed or no-show.
pub fn allowed_targets(from: ReservationStatus) -> &'static [ReservationStatus] {
    if from.is_terminal() {
        return &[];
    }
    match from {
        Pending => &[Confirmed, InProgress, Completed, NoShow, Cancelled],
        Confirmed => &[InProgress, Completed, NoShow, Cancelled],
        InProgress => &[Completed],
        Completed | Cancelled | NoShow => &[],
    }
}

/// Decides whether `actor` may move a reservation from `from` to `to`, and
/// what has to happen alongside the status write.
pub fn check_transition(
    from: ReservationStatus,
    to: ReservationStatus,
    actor: Actor,
) -> Result<SideEffect, BookingError> {
    let invalid = BookingError::InvalidTransition { from, to };
    if !allowed_targets(from).contains(&to) {
        return Err(invalid);
    }
    match (to, actor) {
        (Cancelled, _) => Ok(SideEffect::ReleaseSlot),
        (_, Actor::Owner) => Err(invalid),
        (Completed, Actor::AssignedDoctor) => Ok(SideEffect::RecordCompletion),
        (_, Actor::AssignedDoctor) => Ok(SideEffect::None),
    }
}

pub async fn transition(
    pool: &SqlitePool,
    principal: &Principal,
    reservation_id: &str,
    to: ReservationStatus,
    reason: Option<String>,
) -> Result<Reservation, BookingError> {
    let current = {
        let mut conn = pool.acquire().await?;
        fetch_reservation(&mut conn, reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound)?
    };
    let actor = Actor::resolve(&current, principal)?;
    let effect = check_transition(current.status, to, actor)?;
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;
    let query = if effect == SideEffect::ReleaseSlot {
        sqlx::query(
            r#"UPDATE reservations
               SET status = ?, updated_at = ?,
                   cancelled_by = ?, cancelled_at = ?, cancellation_reason = ?,
                   payment_status = CASE WHEN payment_status = 'paid' THEN 'refunded' ELSE payment_status END
               WHERE id = ? AND status = ?"#,
        )
        .bind(to)
        .bind(&now)
        .bind(actor.role())
        .bind(&now)
        .bind(reason.filter(|reason| !reason.trim().is_empty()))
    } else {
        sqlx::query("UPDATE reservations SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to)
            .bind(&now)
    };
    let updated = query
        .bind(reservation_id)
        .bind(current.status)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    // Someone else moved it between our read and this write.
    if updated != 1 {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to,
        });
    }

    match effect {
        SideEffect::ReleaseSlot => {
            calendar::release_slot(&mut tx, &current.doctor_id, reservation_id).await?;
        }
        SideEffect::RecordCompletion => {
            profiles::count_completion(&mut tx, &current.doctor_id).await?;
        }
        SideEffect::None => {}
    }

    let row = fetch_reservation(&mut tx, reservation_id)
        .await?
        .ok_or(BookingError::ReservationNotFound)?;
    tx.commit().await?;

    log::info!(
        "Reservation {reservation_id} moved {} -> {to} by {} {}",
        current.status,
        actor.role(),
        principal.id
    );
    Ok(row.into())
}

pub async fn cancel(
    pool: &SqlitePool,
    principal: &Principal,
    reservation_id: &str,
    reason: Option<String>,
) -> Result<Reservation, BookingError> {
    transition(pool, principal, reservation_id, Cancelled, reason).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        booking::{book, BookingRequest},
        calendar::get_day,
        db::testing::{insert_doctor, insert_owner_with_pet, memory_pool, monday},
        models::{AppointmentType, PaymentStatus, ROLE_DOCTOR, ROLE_USER},
    };

    #[test]
    fn completed_is_a_dead_end() {
        for to in ReservationStatus::ALL {
            for actor in [Actor::Owner, Actor::AssignedDoctor] {
                assert!(matches!(
                    check_transition(Completed, to, actor),
                    Err(BookingError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn pending_reaches_exactly_five_states() {
        let reachable: Vec<_> = ReservationStatus::ALL
            .into_iter()
            .filter(|to| check_transition(Pending, *to, Actor::AssignedDoctor).is_ok())
            .collect();
        assert_eq!(reachable, vec![Confirmed, InProgress, Completed, Cancelled, NoShow]);
    }

    #[test]
    fn only_terminal_states_lack_targets() {
        for from in ReservationStatus::ALL {
            assert_eq!(allowed_targets(from).is_empty(), from.is_terminal(), "{from}");
        }
    }

    #[test]
    fn owners_may_only_cancel() {
        assert_eq!(
            check_transition(Pending, Cancelled, Actor::Owner).unwrap(),
            SideEffect::ReleaseSlot
        );
        assert_eq!(
            check_transition(Confirmed, Cancelled, Actor::Owner).unwrap(),
            SideEffect::ReleaseSlot
        );
        assert!(check_transition(Pending, Confirmed, Actor::Owner).is_err());
        assert!(check_transition(InProgress, Cancelled, Actor::Owner).is_err());
        assert!(check_transition(InProgress, Cancelled, Actor::AssignedDoctor).is_err());
    }

    #[test]
    fn completion_records_statistics() {
        assert_eq!(
            check_transition(InProgress, Completed, Actor::AssignedDoctor).unwrap(),
            SideEffect::RecordCompletion
        );
        assert_eq!(
            check_transition(Pending, Confirmed, Actor::AssignedDoctor).unwrap(),
            SideEffect::None
        );
    }

    struct Fixture {
        pool: SqlitePool,
        doctor: Principal,
        owner: Principal,
        reservation: Reservation,
    }

    async fn booked() -> Fixture {
        let pool = memory_pool().await;
        let doctor_id = insert_doctor(&pool, "dr-state", 150.0).await;
        let (owner_id, pet_id) = insert_owner_with_pet(&pool, "owner-state").await;
        let reservation = book(
            &pool,
            &owner_id,
            BookingRequest {
                doctor_id: doctor_id.clone(),
                pet_id,
                date: monday().to_string(),
                time: "09:00".into(),
                appointment_type: AppointmentType::Checkup,
                reason: "annual check".into(),
                symptoms: Vec::new(),
                urgency: None,
                notes: None,
            },
        )
        .await
        .unwrap();
        Fixture {
            pool,
            doctor: Principal { id: doctor_id, display_name: "Dr".into(), role: ROLE_DOCTOR.into() },
            owner: Principal { id: owner_id, display_name: "Owner".into(), role: ROLE_USER.into() },
            reservation,
        }
    }

    #[tokio::test]
    async fn doctor_walks_reservation_to_completion() {
        let fx = booked().await;
        for status in [Confirmed, InProgress, Completed] {
            let updated = transition(&fx.pool, &fx.doctor, &fx.reservation.id, status, None)
                .await
                .unwrap();
            assert_eq!(updated.status, status);
        }

        let stats = profiles::doctor_stats(&fx.pool, &fx.doctor.id).await.unwrap();
        assert_eq!(stats.total_reservations, 1);
        assert_eq!(stats.completed_reservations, 1);
        assert_eq!(stats.total_patients, 1);

        // Completion keeps the slot held.
        let mut conn = fx.pool.acquire().await.unwrap();
        let day = get_day(&mut conn, &fx.doctor.id, monday()).await.unwrap().unwrap();
        assert!(!day.slot("09:00").unwrap().is_available);
        drop(conn);

        let err = cancel(&fx.pool, &fx.owner, &fx.reservation.id, None).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { from: Completed, to: Cancelled }));
    }

    #[tokio::test]
    async fn owner_cancellation_releases_and_records() {
        let fx = booked().await;
        let cancelled = cancel(&fx.pool, &fx.owner, &fx.reservation.id, Some("vet too far".into()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, Cancelled);
        let cancellation = cancelled.cancellation.expect("cancellation metadata");
        assert_eq!(cancellation.cancelled_by, ROLE_USER);
        assert_eq!(cancellation.reason.as_deref(), Some("vet too far"));

        let mut conn = fx.pool.acquire().await.unwrap();
        let day = get_day(&mut conn, &fx.doctor.id, monday()).await.unwrap().unwrap();
        let slot = day.slot("09:00").unwrap();
        assert!(slot.is_available);
        assert!(slot.reservation_id.is_none());
    }

    #[tokio::test]
    async fn paid_reservations_are_refunded_on_cancel() {
        let fx = booked().await;
        sqlx::query("UPDATE reservations SET payment_status = 'paid' WHERE id = ?")
            .bind(&fx.reservation.id)
            .execute(&fx.pool)
            .await
            .unwrap();
        let cancelled = cancel(&fx.pool, &fx.doctor, &fx.reservation.id, None).await.unwrap();
        assert_eq!(cancelled.fees.payment_status, PaymentStatus::Refunded);
        assert_eq!(cancelled.cancellation.unwrap().cancelled_by, ROLE_DOCTOR);
    }

    #[tokio::test]
    async fn strangers_and_owners_cannot_drive_the_doctor_flow() {
        let fx = booked().await;
        let stranger = Principal { id: "someone-else".into(), display_name: "X".into(), role: ROLE_USER.into() };
        let other_doctor = Principal { id: "other-doc".into(), display_name: "Y".into(), role: ROLE_DOCTOR.into() };

        assert!(matches!(
            transition(&fx.pool, &stranger, &fx.reservation.id, Cancelled, None).await,
            Err(BookingError::NotAuthorized)
        ));
        assert!(matches!(
            transition(&fx.pool, &other_doctor, &fx.reservation.id, Confirmed, None).await,
            Err(BookingError::NotAuthorized)
        ));
        assert!(matches!(
            transition(&fx.pool, &fx.owner, &fx.reservation.id, Confirmed, None).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition(&fx.pool, &fx.owner, "missing", Cancelled, None).await,
            Err(BookingError::ReservationNotFound)
        ));
    }

    #[tokio::test]
    async fn in_progress_cannot_be_cancelled() {
        let fx = booked().await;
        transition(&fx.pool, &fx.doctor, &fx.reservation.id, InProgress, None).await.unwrap();
        assert!(matches!(
            cancel(&fx.pool, &fx.owner, &fx.reservation.id, None).await,
            Err(BookingError::InvalidTransition { from: InProgress, to: Cancelled })
        ));
    }

    #[tokio::test]
    async fn no_show_keeps_the_slot() {
        let fx = booked().await;
        let updated = transition(&fx.pool, &fx.doctor, &fx.reservation.id, NoShow, None).await.unwrap();
        assert_eq!(updated.status, NoShow);
        assert!(updated.cancellation.is_none());

        let mut conn = fx.pool.acquire().await.unwrap();
        let day = get_day(&mut conn, &fx.doctor.id, monday()).await.unwrap().unwrap();
        assert!(!day.slot("09:00").unwrap().is_available);
    }
}
