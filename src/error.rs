use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::models::ReservationStatus;

/// Everything the booking core can reject a request with.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("doctor is not available for booking")]
    DoctorUnavailable,

    #[error("pet not found or not owned by the requesting user")]
    PetNotOwned,

    #[error("doctor does not work on {0}")]
    DayNotWorking(NaiveDate),

    #[error("no slot starts at {0}")]
    SlotNotFound(String),

    #[error("slot {0} is already booked")]
    SlotUnavailable(String),

    #[error("cannot move a {from} reservation to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("not allowed to act on this reservation")]
    NotAuthorized,

    #[error("reservation not found")]
    ReservationNotFound,

    #[error("calendar day still holds reservations")]
    DayHasReservations,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::DoctorUnavailable => "DOCTOR_UNAVAILABLE",
            BookingError::PetNotOwned => "PET_NOT_OWNED",
            BookingError::DayNotWorking(_) => "DAY_NOT_WORKING",
            BookingError::SlotNotFound(_) => "SLOT_NOT_FOUND",
            BookingError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::NotAuthorized => "NOT_AUTHORIZED",
            BookingError::ReservationNotFound => "RESERVATION_NOT_FOUND",
            BookingError::DayHasReservations => "DAY_HAS_RESERVATIONS",
            BookingError::InvalidInput(_) => "INVALID_INPUT",
            BookingError::Database(_) => "INTERNAL",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::DoctorUnavailable
            | BookingError::PetNotOwned
            | BookingError::SlotNotFound(_)
            | BookingError::ReservationNotFound => StatusCode::NOT_FOUND,
            BookingError::DayNotWorking(_)
            | BookingError::SlotUnavailable(_)
            | BookingError::DayHasReservations
            | BookingError::InvalidTransition { .. } => StatusCode::CONFLICT,
            BookingError::NotAuthorized => StatusCode::FORBIDDEN,
            BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BookingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            BookingError::Database(err) => {
                log::error!("Database error: {err}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(
            BookingError::SlotUnavailable("09:00".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            BookingError::InvalidTransition {
                from: ReservationStatus::Completed,
                to: ReservationStatus::Cancelled,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn database_errors_hide_details() {
        let err = BookingError::Database(sqlx::Error::RowNotFound);
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn transition_message_names_both_states() {
        let err = BookingError::InvalidTransition {
            from: ReservationStatus::Pending,
            to: ReservationStatus::Pending,
        };
        assert_eq!(err.to_string(), "cannot move a pending reservation to pending");
    }
}
