//! Doctor profiles, weekly hours and pets: the facts booking consumes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::{hash_password, new_id},
    calendar,
    error::BookingError,
    models::{ROLE_DOCTOR, ROLE_USER},
    slots::{validate_duration, validate_hours, WorkingHours},
};

#[derive(Debug, Clone, sqlx::FromRow)]
struct DoctorRow {
    id: String,
    display_name: String,
    specialization: Option<String>,
    consultation_fee: f64,
    slot_duration_minutes: i64,
    is_active: bool,
    is_verified: bool,
    total_reservations: i64,
    completed_reservations: i64,
    total_patients: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    pub id: String,
    pub display_name: String,
    pub specialization: Option<String>,
    pub consultation_fee: f64,
    pub slot_duration_minutes: u32,
    pub is_active: bool,
    pub is_verified: bool,
    pub working_hours: Vec<WorkingHours>,
}

impl DoctorProfile {
    pub fn bookable(&self) -> bool {
        self.is_active && self.is_verified
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorStats {
    pub total_reservations: i64,
    pub completed_reservations: i64,
    pub total_patients: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPet {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoctor {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub specialization: Option<String>,
    pub consultation_fee: f64,
    pub slot_duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub specialization: Option<String>,
    pub consultation_fee: Option<f64>,
    pub slot_duration_minutes: Option<u32>,
}

const DOCTOR_SELECT: &str = r#"SELECT d.id, u.display_name, d.specialization, d.consultation_fee,
              d.slot_duration_minutes, d.is_active, d.is_verified,
              d.total_reservations, d.completed_reservations, d.total_patients
       FROM doctors d
       JOIN users u ON u.id = d.id"#;

pub async fn fetch_doctor(pool: &SqlitePool, doctor_id: &str) -> Result<Option<DoctorProfile>, BookingError> {
    let row = sqlx::query_as::<_, DoctorRow>(&format!("{DOCTOR_SELECT} WHERE d.id = ?"))
        .bind(doctor_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let working_hours = working_hours(pool, doctor_id).await?;
    Ok(Some(to_profile(row, working_hours)))
}

/// The doctor's profile, provided they can currently take bookings.
pub async fn bookable_doctor(pool: &SqlitePool, doctor_id: &str) -> Result<DoctorProfile, BookingError> {
    match fetch_doctor(pool, doctor_id).await? {
        Some(doctor) if doctor.bookable() => Ok(doctor),
        _ => Err(BookingError::DoctorUnavailable),
    }
}

pub async fn list_bookable_doctors(pool: &SqlitePool) -> Result<Vec<DoctorProfile>, BookingError> {
    let rows = sqlx::query_as::<_, DoctorRow>(&format!(
        "{DOCTOR_SELECT} WHERE d.is_active = 1 AND d.is_verified = 1 ORDER BY u.display_name"
    ))
    .fetch_all(pool)
    .await?;

    let mut doctors = Vec::with_capacity(rows.len());
    for row in rows {
        let hours = working_hours(pool, &row.id).await?;
        doctors.push(to_profile(row, hours));
    }
    Ok(doctors)
}

pub async fn doctor_stats(pool: &SqlitePool, doctor_id: &str) -> Result<DoctorStats, BookingError> {
    let row = sqlx::query_as::<_, DoctorRow>(&format!("{DOCTOR_SELECT} WHERE d.id = ?"))
        .bind(doctor_id)
        .fetch_optional(pool)
        .await?
        .ok_or(BookingError::DoctorUnavailable)?;
    Ok(DoctorStats {
        total_reservations: row.total_reservations,
        completed_reservations: row.completed_reservations,
        total_patients: row.total_patients,
    })
}

pub async fn working_hours(pool: &SqlitePool, doctor_id: &str) -> Result<Vec<WorkingHours>, BookingError> {
    let rows = sqlx::query_as::<_, (i64, String, String, bool)>(
        r#"SELECT weekday, start_time, end_time, enabled
           FROM doctor_working_hours
           WHERE doctor_id = ?
           ORDER BY weekday"#,
    )
    .bind(doctor_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(weekday, start_time, end_time, enabled)| WorkingHours {
            weekday: weekday as u8,
            start_time,
            end_time,
            enabled,
        })
        .collect())
}

/// Replaces the whole weekly schedule. Materialised working days keep their
/// slots. Days stored as closed for lack of hours are dropped, so they are
/// rebuilt from the new schedule when next needed.
pub async fn replace_working_hours(
    pool: &SqlitePool,
    doctor_id: &str,
    hours: &[WorkingHours],
) -> Result<(), BookingError> {
    validate_hours(hours)?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM doctor_working_hours WHERE doctor_id = ?")
        .bind(doctor_id)
        .execute(&mut *tx)
        .await?;
    for entry in hours {
        sqlx::query(
            r#"INSERT INTO doctor_working_hours (doctor_id, weekday, start_time, end_time, enabled)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(doctor_id)
        .bind(i64::from(entry.weekday))
        .bind(&entry.start_time)
        .bind(&entry.end_time)
        .bind(entry.enabled)
        .execute(&mut *tx)
        .await?;
    }
    let reopened = calendar::forget_unscheduled_days(&mut tx, doctor_id).await?;
    tx.commit().await?;

    if reopened > 0 {
        log::info!("Working hours of doctor {doctor_id} changed; {reopened} closed days will be regenerated");
    }
    Ok(())
}

pub async fn create_doctor(
    pool: &SqlitePool,
    input: NewDoctor,
    default_slot_minutes: u32,
) -> Result<DoctorProfile, BookingError> {
    if input.username.trim().is_empty() || input.display_name.trim().is_empty() {
        return Err(BookingError::InvalidInput("username and display name are required".into()));
    }
    if input.password.trim().len() < 6 {
        return Err(BookingError::InvalidInput("password must be at least 6 characters".into()));
    }
    validate_fee(input.consultation_fee)?;
    let slot_minutes = input.slot_duration_minutes.unwrap_or(default_slot_minutes);
    validate_duration(slot_minutes)?;

    let password_hash = hash_password(&input.password)
        .map_err(|_| BookingError::InvalidInput("password could not be hashed".into()))?;
    let id = new_id();
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;
    insert_user(&mut tx, &id, input.username.trim(), input.display_name.trim(), ROLE_DOCTOR, &password_hash, &now).await?;
    sqlx::query(
        r#"INSERT INTO doctors (id, specialization, consultation_fee, slot_duration_minutes,
                                is_active, is_verified, created_at)
           VALUES (?, ?, ?, ?, 1, 0, ?)"#,
    )
    .bind(&id)
    .bind(&input.specialization)
    .bind(input.consultation_fee)
    .bind(i64::from(slot_minutes))
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    fetch_doctor(pool, &id)
        .await?
        .ok_or(BookingError::DoctorUnavailable)
}

pub async fn register_user(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
    password: &str,
) -> Result<String, BookingError> {
    if username.trim().is_empty() || display_name.trim().is_empty() {
        return Err(BookingError::InvalidInput("username and display name are required".into()));
    }
    if password.trim().len() < 6 {
        return Err(BookingError::InvalidInput("password must be at least 6 characters".into()));
    }
    let password_hash = hash_password(password)
        .map_err(|_| BookingError::InvalidInput("password could not be hashed".into()))?;
    let id = new_id();
    let mut conn = pool.acquire().await?;
    insert_user(&mut conn, &id, username.trim(), display_name.trim(), ROLE_USER, &password_hash, &Utc::now().to_rfc3339()).await?;
    Ok(id)
}

async fn insert_user(
    conn: &mut SqliteConnection,
    id: &str,
    username: &str,
    display_name: &str,
    role: &str,
    password_hash: &str,
    now: &str,
) -> Result<(), BookingError> {
    let taken = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Err(BookingError::InvalidInput(format!("username {username:?} is taken")));
    }

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(id)
    .bind(username)
    .bind(display_name)
    .bind(role)
    .bind(password_hash)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_profile(
    pool: &SqlitePool,
    doctor_id: &str,
    update: ProfileUpdate,
) -> Result<DoctorProfile, BookingError> {
    if let Some(fee) = update.consultation_fee {
        validate_fee(fee)?;
    }
    if let Some(minutes) = update.slot_duration_minutes {
        validate_duration(minutes)?;
    }

    sqlx::query(
        r#"UPDATE doctors
           SET specialization = COALESCE(?, specialization),
               consultation_fee = COALESCE(?, consultation_fee),
               slot_duration_minutes = COALESCE(?, slot_duration_minutes)
           WHERE id = ?"#,
    )
    .bind(update.specialization)
    .bind(update.consultation_fee)
    .bind(update.slot_duration_minutes.map(i64::from))
    .bind(doctor_id)
    .execute(pool)
    .await?;

    fetch_doctor(pool, doctor_id)
        .await?
        .ok_or(BookingError::DoctorUnavailable)
}

pub async fn set_verified(pool: &SqlitePool, doctor_id: &str, verified: bool) -> Result<(), BookingError> {
    let updated = sqlx::query("UPDATE doctors SET is_verified = ? WHERE id = ?")
        .bind(verified)
        .bind(doctor_id)
        .execute(pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(BookingError::DoctorUnavailable);
    }
    Ok(())
}

pub async fn create_pet(pool: &SqlitePool, owner_id: &str, input: NewPet) -> Result<Pet, BookingError> {
    if input.name.trim().is_empty() || input.species.trim().is_empty() {
        return Err(BookingError::InvalidInput("pet name and species are required".into()));
    }
    let pet = Pet {
        id: new_id(),
        owner_id: owner_id.to_string(),
        name: input.name.trim().to_string(),
        species: input.species.trim().to_lowercase(),
        breed: input.breed.filter(|breed| !breed.trim().is_empty()),
        is_active: true,
    };
    sqlx::query(
        r#"INSERT INTO pets (id, owner_id, name, species, breed, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&pet.id)
    .bind(&pet.owner_id)
    .bind(&pet.name)
    .bind(&pet.species)
    .bind(&pet.breed)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(pet)
}

pub async fn list_pets(pool: &SqlitePool, owner_id: &str) -> Result<Vec<Pet>, BookingError> {
    Ok(sqlx::query_as::<_, Pet>(
        "SELECT id, owner_id, name, species, breed, is_active FROM pets WHERE owner_id = ? ORDER BY name",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?)
}

/// The pet, if it is active and belongs to `owner_id`.
pub async fn owned_pet(pool: &SqlitePool, pet_id: &str, owner_id: &str) -> Result<Pet, BookingError> {
    let pet = sqlx::query_as::<_, Pet>(
        "SELECT id, owner_id, name, species, breed, is_active FROM pets WHERE id = ?",
    )
    .bind(pet_id)
    .fetch_optional(pool)
    .await?;

    match pet {
        Some(pet) if pet.is_active && pet.owner_id == owner_id => Ok(pet),
        _ => Err(BookingError::PetNotOwned),
    }
}

pub async fn count_reservation(conn: &mut SqliteConnection, doctor_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE doctors SET total_reservations = total_reservations + 1 WHERE id = ?")
        .bind(doctor_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn count_completion(conn: &mut SqliteConnection, doctor_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE doctors
           SET completed_reservations = completed_reservations + 1,
               total_patients = total_patients + 1
           WHERE id = ?"#,
    )
    .bind(doctor_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn validate_fee(fee: f64) -> Result<(), BookingError> {
    if fee.is_finite() && fee >= 0.0 {
        Ok(())
    } else {
        Err(BookingError::InvalidInput("consultation fee must be a non-negative amount".into()))
    }
}

fn to_profile(row: DoctorRow, working_hours: Vec<WorkingHours>) -> DoctorProfile {
    DoctorProfile {
        id: row.id,
        display_name: row.display_name,
        specialization: row.specialization,
        consultation_fee: row.consultation_fee,
        slot_duration_minutes: row.slot_duration_minutes as u32,
        is_active: row.is_active,
        is_verified: row.is_verified,
        working_hours,
    }
}
