use actix_web::{web, HttpResponse};
use chrono::Days;
use serde::Deserialize;
use serde_json::json;

use crate::{
    calendar,
    db::log_activity,
    error::BookingError,
    profiles,
    slots::{self, parse_day},
    state::AppState,
};

const MAX_AVAILABILITY_DAYS: u64 = 14;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterForm {
    username: String,
    display_name: String,
    password: String,
}

#[derive(Deserialize)]
struct AvailabilityQuery {
    date: String,
    days: Option<u64>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/doctors").route(web::get().to(list_doctors)))
        .service(
            web::resource("/doctors/{id}/availability").route(web::get().to(availability)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn register(
    state: web::Data<AppState>,
    form: web::Json<RegisterForm>,
) -> Result<HttpResponse, BookingError> {
    let form = form.into_inner();
    let id = profiles::register_user(&state.db, &form.username, &form.display_name, &form.password).await?;

    log_activity(
        &state.db,
        "user_registered",
        &format!("{} registered.", form.username.trim()),
        Some(&id),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

async fn list_doctors(state: web::Data<AppState>) -> Result<HttpResponse, BookingError> {
    let doctors = profiles::list_bookable_doctors(&state.db).await?;
    Ok(HttpResponse::Ok().json(doctors))
}

/// Calendar days for a bookable doctor. Days not yet stored are computed from
/// the weekly hours and left unsaved.
async fn availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, BookingError> {
    let doctor = profiles::bookable_doctor(&state.db, &path.into_inner()).await?;
    let first = parse_day(&query.date)?;
    let days = query.days.unwrap_or(1);
    if !(1..=MAX_AVAILABILITY_DAYS).contains(&days) {
        return Err(BookingError::InvalidInput(format!(
            "days must be between 1 and {MAX_AVAILABILITY_DAYS}"
        )));
    }

    let mut calendar_days = Vec::new();
    for offset in 0..days {
        let date = first
            .checked_add_days(Days::new(offset))
            .ok_or_else(|| BookingError::InvalidInput("date out of range".into()))?;
        let day = calendar::preview_day(&state.db, &doctor.id, date, |date| {
            slots::day_slots(&doctor.working_hours, date, doctor.slot_duration_minutes)
        })
        .await?;
        calendar_days.push(day);
    }

    Ok(HttpResponse::Ok().json(calendar_days))
}
