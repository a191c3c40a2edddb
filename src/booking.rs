//! Turning booking requests into claimed slots plus `pending` reservations.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{types::Json, SqliteConnection, SqlitePool};

use crate::{
    auth::{new_id, Principal},
    calendar,
    db::fetch_reservation,
    error::BookingError,
    models::{
        AppointmentType, Fees, Reservation, ReservationRow, ReservationStatus, Urgency,
        RESERVATION_COLUMNS,
    },
    profiles::{self, DoctorProfile},
    slots::{self, format_clock, parse_clock, parse_day},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub doctor_id: String,
    pub pet_id: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub reason: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub urgency: Option<Urgency>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub time: String,
}

/// Books `request` for `user_id`.
///
/// The slot claim, the reservation row and the doctor's counter are written in
/// one transaction; a reservation never exists without its slot and a claimed
/// slot never outlives a failed insert.
pub async fn book(
    pool: &SqlitePool,
    user_id: &str,
    request: BookingRequest,
) -> Result<Reservation, BookingError> {
    let date = parse_day(&request.date)?;
    let time = format_clock(parse_clock(&request.time)?);
    if request.reason.trim().is_empty() {
        return Err(BookingError::InvalidInput("a reason for the visit is required".into()));
    }

    let doctor = profiles::bookable_doctor(pool, &request.doctor_id).await?;
    profiles::owned_pet(pool, &request.pet_id, user_id).await?;
    open_day(pool, &doctor, date).await?;

    let reservation_id = new_id();
    let fees = Fees::new(doctor.consultation_fee, 0.0);
    let now = Utc::now().to_rfc3339();
    let row = ReservationRow {
        id: reservation_id.clone(),
        user_id: user_id.to_string(),
        doctor_id: doctor.id.clone(),
        pet_id: request.pet_id,
        appointment_date: date,
        appointment_time: time.clone(),
        appointment_type: request.appointment_type,
        reason: request.reason.trim().to_string(),
        symptoms: Json(
            request
                .symptoms
                .into_iter()
                .map(|symptom| symptom.trim().to_string())
                .filter(|symptom| !symptom.is_empty())
                .collect(),
        ),
        urgency: request.urgency.unwrap_or_default(),
        notes: request.notes.filter(|notes| !notes.trim().is_empty()),
        status: ReservationStatus::Pending,
        consultation_fee: fees.consultation_fee,
        additional_charges: fees.additional_charges,
        total_amount: fees.total_amount,
        payment_status: fees.payment_status,
        cancelled_by: None,
        cancelled_at: None,
        cancellation_reason: None,
        created_at: now.clone(),
        updated_at: now,
    };

    let mut tx = pool.begin().await?;
    calendar::claim_slot(&mut tx, &doctor.id, date, &time, &reservation_id).await?;

    if let Err(err) = persist(&mut tx, &row).await {
        log::warn!("Reservation {reservation_id} could not be stored, releasing slot {date} {time}: {err}");
        if let Err(rollback_err) = tx.rollback().await {
            log::error!("Rolling back claim of {date} {time} for doctor {} failed: {rollback_err}", doctor.id);
        }
        return Err(err.into());
    }
    tx.commit().await?;

    log::info!(
        "Reservation {reservation_id} booked with doctor {} on {date} at {time}",
        doctor.id
    );
    Ok(row.into())
}

/// Moves a `pending` or `confirmed` reservation to another slot of the same
/// doctor. The old slot is released and the new one claimed in one
/// transaction, so a failed claim leaves the original booking untouched. The
/// reservation goes back to `pending` for the doctor to confirm again.
pub async fn reschedule(
    pool: &SqlitePool,
    principal: &Principal,
    reservation_id: &str,
    request: RescheduleRequest,
) -> Result<Reservation, BookingError> {
    let date = parse_day(&request.date)?;
    let time = format_clock(parse_clock(&request.time)?);

    let current = {
        let mut conn = pool.acquire().await?;
        fetch_reservation(&mut conn, reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound)?
    };
    if current.user_id != principal.id {
        return Err(BookingError::NotAuthorized);
    }
    if !matches!(
        current.status,
        ReservationStatus::Pending | ReservationStatus::Confirmed
    ) {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: ReservationStatus::Pending,
        });
    }

    let doctor = profiles::bookable_doctor(pool, &current.doctor_id).await?;
    open_day(pool, &doctor, date).await?;

    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        r#"UPDATE reservations
           SET appointment_date = ?, appointment_time = ?, status = ?, updated_at = ?
           WHERE id = ? AND status = ?"#,
    )
    .bind(date)
    .bind(&time)
    .bind(ReservationStatus::Pending)
    .bind(Utc::now().to_rfc3339())
    .bind(reservation_id)
    .bind(current.status)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if updated != 1 {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: ReservationStatus::Pending,
        });
    }

    calendar::release_slot(&mut tx, &doctor.id, reservation_id).await?;
    calendar::claim_slot(&mut tx, &doctor.id, date, &time, reservation_id).await?;

    let row = fetch_reservation(&mut tx, reservation_id)
        .await?
        .ok_or(BookingError::ReservationNotFound)?;
    tx.commit().await?;

    log::info!(
        "Reservation {reservation_id} moved from {} {} to {date} {time}",
        current.appointment_date,
        current.appointment_time
    );
    Ok(row.into())
}

/// A reservation the principal is party to.
pub async fn visible_reservation(
    pool: &SqlitePool,
    principal: &Principal,
    reservation_id: &str,
) -> Result<Reservation, BookingError> {
    let mut conn = pool.acquire().await?;
    let row = fetch_reservation(&mut conn, reservation_id)
        .await?
        .ok_or(BookingError::ReservationNotFound)?;
    if row.user_id != principal.id && row.doctor_id != principal.id {
        return Err(BookingError::NotAuthorized);
    }
    Ok(row.into())
}

/// Reservations booked by a user, or assigned to a doctor, newest slot first.
pub async fn list_reservations(
    pool: &SqlitePool,
    principal: &Principal,
    status: Option<ReservationStatus>,
) -> Result<Vec<Reservation>, BookingError> {
    let column = if principal.is_doctor() { "doctor_id" } else { "user_id" };
    let rows = sqlx::query_as::<_, ReservationRow>(&format!(
        r#"SELECT {RESERVATION_COLUMNS}
           FROM reservations
           WHERE {column} = ? AND (? IS NULL OR status = ?)
           ORDER BY appointment_date DESC, appointment_time DESC"#
    ))
    .bind(&principal.id)
    .bind(status)
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Reservation::from).collect())
}

/// A doctor's open reservations from `from` onwards, soonest first.
pub async fn upcoming_for_doctor(
    pool: &SqlitePool,
    doctor_id: &str,
    from: NaiveDate,
    limit: i64,
) -> Result<Vec<Reservation>, BookingError> {
    let rows = sqlx::query_as::<_, ReservationRow>(&format!(
        r#"SELECT {RESERVATION_COLUMNS}
           FROM reservations
           WHERE doctor_id = ? AND appointment_date >= ?
             AND status IN ('pending', 'confirmed', 'in-progress')
           ORDER BY appointment_date, appointment_time
           LIMIT ?"#
    ))
    .bind(doctor_id)
    .bind(from)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Reservation::from).collect())
}

/// Materialises the doctor's day and insists it is a working one.
async fn open_day(pool: &SqlitePool, doctor: &DoctorProfile, date: NaiveDate) -> Result<(), BookingError> {
    let day = calendar::ensure_day(pool, &doctor.id, date, |date| {
        slots::day_slots(&doctor.working_hours, date, doctor.slot_duration_minutes)
    })
    .await?;
    if !day.is_working_day {
        return Err(BookingError::DayNotWorking(date));
    }
    Ok(())
}

async fn persist(conn: &mut SqliteConnection, row: &ReservationRow) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO reservations ({RESERVATION_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(&row.doctor_id)
    .bind(&row.pet_id)
    .bind(row.appointment_date)
    .bind(&row.appointment_time)
    .bind(row.appointment_type)
    .bind(&row.reason)
    .bind(&row.symptoms)
    .bind(row.urgency)
    .bind(&row.notes)
    .bind(row.status)
    .bind(row.consultation_fee)
    .bind(row.additional_charges)
    .bind(row.total_amount)
    .bind(row.payment_status)
    .bind(&row.cancelled_by)
    .bind(&row.cancelled_at)
    .bind(&row.cancellation_reason)
    .bind(&row.created_at)
    .bind(&row.updated_at)
    .execute(&mut *conn)
    .await?;

    profiles::count_reservation(conn, &row.doctor_id).await
}
