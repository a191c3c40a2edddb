use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{
    auth::Principal,
    config::AppConfig,
    models::{Reservation, ReservationStatus},
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        Self { db, events, config }
    }

    /// Best effort: nobody listening is not an error.
    pub fn publish(&self, kind: &str, reservation: &Reservation) {
        let _ = self.events.send(ServerEvent::from_reservation(kind, reservation));
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub kind: String,
    pub reservation_id: String,
    pub user_id: String,
    pub doctor_id: String,
    pub pet_id: String,
    pub status: ReservationStatus,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
}

impl ServerEvent {
    pub fn from_reservation(kind: &str, reservation: &Reservation) -> Self {
        Self {
            kind: kind.to_string(),
            reservation_id: reservation.id.clone(),
            user_id: reservation.user_id.clone(),
            doctor_id: reservation.doctor_id.clone(),
            pet_id: reservation.pet_id.clone(),
            status: reservation.status,
            appointment_date: reservation.appointment_date,
            appointment_time: reservation.appointment_time.clone(),
        }
    }

    pub fn concerns(&self, principal: &Principal) -> bool {
        self.user_id == principal.id || self.doctor_id == principal.id
    }
}
