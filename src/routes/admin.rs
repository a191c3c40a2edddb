use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, Principal},
    db::log_activity,
    error::BookingError,
    models::ActivityRow,
    profiles::{self, NewDoctor},
    state::AppState,
};

const ACTIVITY_LIMIT: i64 = 50;

#[derive(Deserialize)]
struct VerifyForm {
    verified: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/doctors").route(web::post().to(create_doctor)))
            .service(web::resource("/doctors/{id}/verify").route(web::post().to(verify_doctor)))
            .service(web::resource("/activity").route(web::get().to(recent_activity))),
    );
}

async fn create_doctor(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    form: web::Json<NewDoctor>,
) -> Result<HttpResponse, BookingError> {
    let doctor = profiles::create_doctor(
        &state.db,
        form.into_inner(),
        state.config.default_slot_minutes,
    )
    .await?;

    log_activity(
        &state.db,
        "doctor_created",
        &format!("{} added doctor {}.", auth.display_name, doctor.display_name),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(doctor))
}

async fn verify_doctor(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<VerifyForm>,
) -> Result<HttpResponse, BookingError> {
    let doctor_id = path.into_inner();
    profiles::set_verified(&state.db, &doctor_id, form.verified).await?;

    log_activity(
        &state.db,
        "doctor_verified",
        &format!(
            "{} set verification of doctor {doctor_id} to {}.",
            auth.display_name, form.verified
        ),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "id": doctor_id, "verified": form.verified })))
}

async fn recent_activity(state: web::Data<AppState>) -> Result<HttpResponse, BookingError> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"SELECT kind, message, created_at, user_id, reservation_id
           FROM activities
           ORDER BY created_at DESC
           LIMIT ?"#,
    )
    .bind(ACTIVITY_LIMIT)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}
