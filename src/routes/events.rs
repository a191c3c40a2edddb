use actix_web::{http::header, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{basic_validator, Principal},
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(stream_events)),
    );
}

/// Reservation changes the caller is party to, as server-sent events.
/// Lagged receivers skip the missed events rather than closing the stream.
async fn stream_events(state: web::Data<AppState>, auth: web::ReqData<Principal>) -> HttpResponse {
    let principal = auth.into_inner();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.concerns(&principal) => {
            Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
        }
        Ok(_) => None,
        Err(err) => {
            log::debug!("Event stream lagged: {err}");
            None
        }
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: {}\ndata: {}\n\n", event.kind, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationStatus;
    use chrono::NaiveDate;

    fn event() -> ServerEvent {
        ServerEvent {
            kind: "reservation_created".into(),
            reservation_id: "r1".into(),
            user_id: "owner".into(),
            doctor_id: "doc".into(),
            pet_id: "pet".into(),
            status: ReservationStatus::Pending,
            appointment_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            appointment_time: "09:00".into(),
        }
    }

    #[test]
    fn frames_event_as_sse() {
        let bytes = event_to_bytes(&event());
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("event: reservation_created\ndata: {"));
        assert!(text.contains("\"reservationId\":\"r1\""));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn only_parties_see_an_event() {
        let event = event();
        let principal = |id: &str| Principal {
            id: id.into(),
            display_name: id.into(),
            role: "user".into(),
        };
        assert!(event.concerns(&principal("owner")));
        assert!(event.concerns(&principal("doc")));
        assert!(!event.concerns(&principal("someone-else")));
    }
}
