use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    auth::{basic_validator, Principal},
    booking::{self, BookingRequest, RescheduleRequest},
    db::log_activity,
    error::BookingError,
    lifecycle::{self, StatusChange},
    models::{Reservation, ReservationStatus},
    profiles::{self, NewPet},
    state::AppState,
};

#[derive(Deserialize)]
struct ReservationFilter {
    status: Option<ReservationStatus>,
}

#[derive(Deserialize, Default)]
struct CancelForm {
    reason: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::basic(basic_validator))
            .service(web::resource("/me").route(web::get().to(me)))
            .service(
                web::resource("/pets")
                    .route(web::get().to(list_pets))
                    .route(web::post().to(create_pet)),
            )
            .service(
                web::resource("/reservations")
                    .route(web::get().to(list_reservations))
                    .route(web::post().to(create_reservation)),
            )
            .service(web::resource("/reservations/{id}").route(web::get().to(show_reservation)))
            .service(
                web::resource("/reservations/{id}/cancel").route(web::post().to(cancel_reservation)),
            )
            .service(
                web::resource("/reservations/{id}/reschedule")
                    .route(web::post().to(reschedule_reservation)),
            )
            .service(
                web::resource("/reservations/{id}/status").route(web::post().to(update_status)),
            ),
    );
}

async fn me(auth: web::ReqData<Principal>) -> HttpResponse {
    HttpResponse::Ok().json(auth.into_inner())
}

async fn list_pets(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> Result<HttpResponse, BookingError> {
    let pets = profiles::list_pets(&state.db, &auth.id).await?;
    Ok(HttpResponse::Ok().json(pets))
}

async fn create_pet(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    form: web::Json<NewPet>,
) -> Result<HttpResponse, BookingError> {
    if !auth.is_user() {
        return Err(BookingError::NotAuthorized);
    }
    let pet = profiles::create_pet(&state.db, &auth.id, form.into_inner()).await?;
    Ok(HttpResponse::Created().json(pet))
}

async fn list_reservations(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    query: web::Query<ReservationFilter>,
) -> Result<HttpResponse, BookingError> {
    let reservations = booking::list_reservations(&state.db, &auth, query.status).await?;
    Ok(HttpResponse::Ok().json(reservations))
}

async fn create_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    form: web::Json<BookingRequest>,
) -> Result<HttpResponse, BookingError> {
    if !auth.is_user() {
        return Err(BookingError::NotAuthorized);
    }
    let reservation = booking::book(&state.db, &auth.id, form.into_inner()).await?;

    log_activity(
        &state.db,
        "reservation_created",
        &format!(
            "{} booked {} at {}.",
            auth.display_name, reservation.appointment_date, reservation.appointment_time
        ),
        Some(&auth.id),
        Some(&reservation.id),
    )
    .await;
    state.publish("reservation_created", &reservation);

    Ok(HttpResponse::Created().json(reservation))
}

async fn show_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError> {
    let reservation = booking::visible_reservation(&state.db, &auth, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reservation))
}

async fn cancel_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: Option<web::Json<CancelForm>>,
) -> Result<HttpResponse, BookingError> {
    let reason = form.map(|form| form.into_inner()).unwrap_or_default().reason;
    let reservation = lifecycle::cancel(&state.db, &auth, &path.into_inner(), reason).await?;
    Ok(announce(&state, &auth, "reservation_cancelled", reservation).await)
}

async fn reschedule_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<RescheduleRequest>,
) -> Result<HttpResponse, BookingError> {
    let reservation =
        booking::reschedule(&state.db, &auth, &path.into_inner(), form.into_inner()).await?;
    Ok(announce(&state, &auth, "reservation_rescheduled", reservation).await)
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<StatusChange>,
) -> Result<HttpResponse, BookingError> {
    let change = form.into_inner();
    let reservation =
        lifecycle::transition(&state.db, &auth, &path.into_inner(), change.status, change.reason)
            .await?;
    Ok(announce(&state, &auth, "reservation_updated", reservation).await)
}

async fn announce(
    state: &AppState,
    auth: &Principal,
    kind: &str,
    reservation: Reservation,
) -> HttpResponse {
    log_activity(
        &state.db,
        kind,
        &format!(
            "{} set reservation {} to {}.",
            auth.display_name, reservation.id, reservation.status
        ),
        Some(&auth.id),
        Some(&reservation.id),
    )
    .await;
    state.publish(kind, &reservation);
    HttpResponse::Ok().json(reservation)
}
