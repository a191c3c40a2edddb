//! Per-doctor, per-date slot calendars.
//!
//! A day is created at most once per `(doctor_id, date)`; claims and releases
//! are single conditional updates so two bookers can never both win a slot.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::new_id,
    error::BookingError,
    models::{CalendarDay, CalendarDayRow, Slot},
};

pub const NO_HOURS_NOTE: &str = "no working hours";

pub async fn get_day(
    conn: &mut SqliteConnection,
    doctor_id: &str,
    date: NaiveDate,
) -> Result<Option<CalendarDay>, sqlx::Error> {
    let row = sqlx::query_as::<_, CalendarDayRow>(
        r#"SELECT id, doctor_id, date, is_working_day, note
           FROM calendar_days
           WHERE doctor_id = ? AND date = ?"#,
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let slots = day_slots(conn, &row.id).await?;
    Ok(Some(to_day(row, slots)))
}

/// Returns the stored day, creating it from `generate` when absent.
///
/// A generator reporting [`BookingError::DayNotWorking`] yields a stored
/// non-working day; any other generator error is returned untouched.
pub async fn ensure_day<F>(
    pool: &SqlitePool,
    doctor_id: &str,
    date: NaiveDate,
    generate: F,
) -> Result<CalendarDay, BookingError>
where
    F: FnOnce(NaiveDate) -> Result<Vec<Slot>, BookingError>,
{
    {
        let mut conn = pool.acquire().await?;
        if let Some(day) = get_day(&mut conn, doctor_id, date).await? {
            return Ok(day);
        }
    }

    let (is_working_day, slots, note) = fresh_day(date, generate)?;

    let day_id = new_id();
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"INSERT INTO calendar_days (id, doctor_id, date, is_working_day, note, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT (doctor_id, date) DO NOTHING"#,
    )
    .bind(&day_id)
    .bind(doctor_id)
    .bind(date)
    .bind(is_working_day)
    .bind(note)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 1 {
        insert_slots(&mut tx, &day_id, &slots).await?;
        log::debug!(
            "Created calendar day {date} for doctor {doctor_id} with {} slots",
            slots.len()
        );
    }

    let day = get_day(&mut tx, doctor_id, date)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    tx.commit().await?;
    Ok(day)
}

/// The stored day, or the day `ensure_day` would create for it. Nothing is
/// written, so reads from anonymous callers leave the calendar untouched.
pub async fn preview_day<F>(
    pool: &SqlitePool,
    doctor_id: &str,
    date: NaiveDate,
    generate: F,
) -> Result<CalendarDay, BookingError>
where
    F: FnOnce(NaiveDate) -> Result<Vec<Slot>, BookingError>,
{
    {
        let mut conn = pool.acquire().await?;
        if let Some(day) = get_day(&mut conn, doctor_id, date).await? {
            return Ok(day);
        }
    }

    let (is_working_day, slots, note) = fresh_day(date, generate)?;
    Ok(CalendarDay {
        id: String::new(),
        doctor_id: doctor_id.to_string(),
        date,
        is_working_day,
        note: note.map(str::to_string),
        slots,
    })
}

fn fresh_day<F>(date: NaiveDate, generate: F) -> Result<(bool, Vec<Slot>, Option<&'static str>), BookingError>
where
    F: FnOnce(NaiveDate) -> Result<Vec<Slot>, BookingError>,
{
    match generate(date) {
        Ok(slots) => Ok((true, slots, None)),
        Err(BookingError::DayNotWorking(_)) => Ok((false, Vec::new(), Some(NO_HOURS_NOTE))),
        Err(err) => Err(err),
    }
}

/// Hands the slot starting at `start_time` to `reservation_id`, provided it is
/// still free on a working day.
pub async fn claim_slot(
    conn: &mut SqliteConnection,
    doctor_id: &str,
    date: NaiveDate,
    start_time: &str,
    reservation_id: &str,
) -> Result<(), BookingError> {
    let claimed = sqlx::query(
        r#"UPDATE calendar_slots
           SET is_available = 0, reservation_id = ?
           WHERE start_time = ?
             AND is_available = 1
             AND day_id = (SELECT id FROM calendar_days
                           WHERE doctor_id = ? AND date = ? AND is_working_day = 1)"#,
    )
    .bind(reservation_id)
    .bind(start_time)
    .bind(doctor_id)
    .bind(date)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if claimed == 1 {
        log::debug!("Slot {date} {start_time} of doctor {doctor_id} claimed by {reservation_id}");
        return Ok(());
    }

    let day = sqlx::query_as::<_, (String, bool)>(
        "SELECT id, is_working_day FROM calendar_days WHERE doctor_id = ? AND date = ?",
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await?;

    match day {
        Some((_, false)) => Err(BookingError::DayNotWorking(date)),
        Some((day_id, true)) => {
            let exists = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM calendar_slots WHERE day_id = ? AND start_time = ?",
            )
            .bind(&day_id)
            .bind(start_time)
            .fetch_one(&mut *conn)
            .await?;
            if exists == 0 {
                Err(BookingError::SlotNotFound(start_time.to_string()))
            } else {
                Err(BookingError::SlotUnavailable(start_time.to_string()))
            }
        }
        None => Err(BookingError::SlotNotFound(start_time.to_string())),
    }
}

/// Frees whichever of the doctor's slots `reservation_id` holds. Returns
/// whether a slot was actually released; finding none is not an error.
pub async fn release_slot(
    conn: &mut SqliteConnection,
    doctor_id: &str,
    reservation_id: &str,
) -> Result<bool, sqlx::Error> {
    let released = sqlx::query(
        r#"UPDATE calendar_slots
           SET is_available = 1, reservation_id = NULL
           WHERE reservation_id = ?
             AND day_id IN (SELECT id FROM calendar_days WHERE doctor_id = ?)"#,
    )
    .bind(reservation_id)
    .bind(doctor_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if released == 0 {
        log::debug!("Reservation {reservation_id} held no slot of doctor {doctor_id}");
    }
    Ok(released > 0)
}

/// Explicit override of one day: working flag, slot list and note. Refused
/// while any slot of the existing day is claimed.
pub async fn set_day(
    pool: &SqlitePool,
    doctor_id: &str,
    date: NaiveDate,
    is_working_day: bool,
    slots: Vec<Slot>,
    note: Option<String>,
) -> Result<CalendarDay, BookingError> {
    let slots = if is_working_day { slots } else { Vec::new() };
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let day_id = match get_day(&mut tx, doctor_id, date).await? {
        Some(existing) => {
            let cleared = sqlx::query(
                "DELETE FROM calendar_slots WHERE day_id = ? AND reservation_id IS NULL",
            )
            .bind(&existing.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            // A claimed slot survived the delete; dropping `tx` rolls it back.
            if cleared != existing.slots.len() as u64 {
                return Err(BookingError::DayHasReservations);
            }
            sqlx::query(
                "UPDATE calendar_days SET is_working_day = ?, note = ?, updated_at = ? WHERE id = ?",
            )
            .bind(is_working_day)
            .bind(&note)
            .bind(&now)
            .bind(&existing.id)
            .execute(&mut *tx)
            .await?;
            existing.id
        }
        None => {
            let day_id = new_id();
            sqlx::query(
                r#"INSERT INTO calendar_days (id, doctor_id, date, is_working_day, note, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&day_id)
            .bind(doctor_id)
            .bind(date)
            .bind(is_working_day)
            .bind(&note)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            day_id
        }
    };

    insert_slots(&mut tx, &day_id, &slots).await?;
    let day = get_day(&mut tx, doctor_id, date)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    tx.commit().await?;

    log::info!(
        "Calendar {date} of doctor {doctor_id} overridden ({} slots, working: {is_working_day})",
        day.slots.len()
    );
    Ok(day)
}

/// Drops stored days that were closed only because the weekly hours had no
/// entry for them, so the next `ensure_day` builds them from current hours.
pub async fn forget_unscheduled_days(
    conn: &mut SqliteConnection,
    doctor_id: &str,
) -> Result<u64, sqlx::Error> {
    let forgotten = sqlx::query(
        r#"DELETE FROM calendar_days
           WHERE doctor_id = ? AND is_working_day = 0 AND note = ?
             AND NOT EXISTS (SELECT 1 FROM calendar_slots WHERE calendar_slots.day_id = calendar_days.id)"#,
    )
    .bind(doctor_id)
    .bind(NO_HOURS_NOTE)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(forgotten)
}

/// Stored days in `[from, to]`, oldest first. Days never materialised are absent.
pub async fn list_days(
    pool: &SqlitePool,
    doctor_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CalendarDay>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let rows = sqlx::query_as::<_, CalendarDayRow>(
        r#"SELECT id, doctor_id, date, is_working_day, note
           FROM calendar_days
           WHERE doctor_id = ? AND date BETWEEN ? AND ?
           ORDER BY date"#,
    )
    .bind(doctor_id)
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await?;

    let mut days = Vec::with_capacity(rows.len());
    for row in rows {
        let slots = day_slots(&mut conn, &row.id).await?;
        days.push(to_day(row, slots));
    }
    Ok(days)
}

async fn day_slots(conn: &mut SqliteConnection, day_id: &str) -> Result<Vec<Slot>, sqlx::Error> {
    sqlx::query_as::<_, Slot>(
        r#"SELECT start_time, end_time, is_available, reservation_id
           FROM calendar_slots
           WHERE day_id = ?
           ORDER BY start_time"#,
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await
}

async fn insert_slots(conn: &mut SqliteConnection, day_id: &str, slots: &[Slot]) -> Result<(), sqlx::Error> {
    for slot in slots {
        sqlx::query(
            r#"INSERT INTO calendar_slots (day_id, start_time, end_time, is_available, reservation_id)
               VALUES (?, ?, ?, 1, NULL)"#,
        )
        .bind(day_id)
        .bind(&slot.start_time)
        .bind(&slot.end_time)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn to_day(row: CalendarDayRow, slots: Vec<Slot>) -> CalendarDay {
    CalendarDay {
        id: row.id,
        doctor_id: row.doctor_id,
        date: row.date,
        is_working_day: row.is_working_day,
        note: row.note,
        slots,
    }
}
