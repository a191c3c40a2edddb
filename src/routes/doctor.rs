use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::{Days, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{doctor_validator, Principal},
    booking, calendar,
    db::log_activity,
    error::BookingError,
    models::Reservation,
    profiles::{self, DoctorProfile, DoctorStats, ProfileUpdate},
    slots::{self, parse_day, SlotSpec, WorkingHours},
    state::AppState,
};

const UPCOMING_LIMIT: i64 = 20;
const MAX_CALENDAR_DAYS: u64 = 92;

#[derive(Serialize)]
struct Dashboard {
    profile: DoctorProfile,
    stats: DoctorStats,
    upcoming: Vec<Reservation>,
}

#[derive(Deserialize)]
struct CalendarRange {
    from: String,
    to: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayOverride {
    is_working_day: bool,
    slots: Option<Vec<SlotSpec>>,
    note: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/doctor")
            .wrap(HttpAuthentication::basic(doctor_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/profile").route(web::put().to(update_profile)))
            .service(
                web::resource("/working-hours")
                    .route(web::get().to(show_working_hours))
                    .route(web::put().to(replace_working_hours)),
            )
            .service(web::resource("/calendar").route(web::get().to(list_calendar)))
            .service(web::resource("/calendar/{date}").route(web::put().to(override_day))),
    );
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> Result<HttpResponse, BookingError> {
    let profile = profiles::fetch_doctor(&state.db, &auth.id)
        .await?
        .ok_or(BookingError::DoctorUnavailable)?;
    let stats = profiles::doctor_stats(&state.db, &auth.id).await?;
    let today = Utc::now().date_naive();
    let upcoming = booking::upcoming_for_doctor(&state.db, &auth.id, today, UPCOMING_LIMIT).await?;

    Ok(HttpResponse::Ok().json(Dashboard {
        profile,
        stats,
        upcoming,
    }))
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    form: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, BookingError> {
    let profile = profiles::update_profile(&state.db, &auth.id, form.into_inner()).await?;
    log_activity(
        &state.db,
        "doctor_profile_updated",
        &format!("{} updated their profile.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(profile))
}

async fn show_working_hours(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> Result<HttpResponse, BookingError> {
    let hours = profiles::working_hours(&state.db, &auth.id).await?;
    Ok(HttpResponse::Ok().json(hours))
}

async fn replace_working_hours(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    form: web::Json<Vec<WorkingHours>>,
) -> Result<HttpResponse, BookingError> {
    let hours = form.into_inner();
    profiles::replace_working_hours(&state.db, &auth.id, &hours).await?;
    Ok(HttpResponse::Ok().json(hours))
}

async fn list_calendar(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    query: web::Query<CalendarRange>,
) -> Result<HttpResponse, BookingError> {
    let from = parse_day(&query.from)?;
    let to = match &query.to {
        Some(to) => parse_day(to)?,
        None => from,
    };
    if to < from {
        return Err(BookingError::InvalidInput("`to` must not precede `from`".into()));
    }
    let limit = from
        .checked_add_days(Days::new(MAX_CALENDAR_DAYS))
        .unwrap_or(from);
    if to > limit {
        return Err(BookingError::InvalidInput(format!(
            "at most {MAX_CALENDAR_DAYS} days can be listed at once"
        )));
    }

    let days = calendar::list_days(&state.db, &auth.id, from, to).await?;
    Ok(HttpResponse::Ok().json(days))
}

async fn override_day(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<DayOverride>,
) -> Result<HttpResponse, BookingError> {
    let date = parse_day(&path.into_inner())?;
    let DayOverride {
        is_working_day,
        slots: specs,
        note,
    } = form.into_inner();

    let slots = match (is_working_day, specs) {
        (false, _) => Vec::new(),
        (true, Some(specs)) => slots::explicit_slots(&specs)?,
        (true, None) => {
            let doctor = profiles::fetch_doctor(&state.db, &auth.id)
                .await?
                .ok_or(BookingError::DoctorUnavailable)?;
            slots::day_slots(&doctor.working_hours, date, doctor.slot_duration_minutes).map_err(
                |err| match err {
                    BookingError::DayNotWorking(_) => BookingError::InvalidInput(
                        "no working hours cover that weekday; list the slots explicitly".into(),
                    ),
                    other => other,
                },
            )?
        }
    };

    let day = calendar::set_day(&state.db, &auth.id, date, is_working_day, slots, note).await?;
    log_activity(
        &state.db,
        "calendar_overridden",
        &format!("{} changed their calendar for {date}.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(day))
}
