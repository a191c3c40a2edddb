use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_DOCTOR: &str = "doctor";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    #[cfg(test)]
    pub const ALL: [ReservationStatus; 6] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::InProgress,
        ReservationStatus::Completed,
        ReservationStatus::Cancelled,
        ReservationStatus::NoShow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::InProgress => "in-progress",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no-show",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled | ReservationStatus::NoShow
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum AppointmentType {
    Consultation,
    Vaccination,
    Checkup,
    Surgery,
    Emergency,
    FollowUp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
    pub reservation_id: Option<String>,
}

impl Slot {
    pub fn open(start_time: String, end_time: String) -> Self {
        Self {
            start_time,
            end_time,
            is_available: true,
            reservation_id: None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CalendarDayRow {
    pub id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub is_working_day: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    #[serde(skip)]
    pub id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub is_working_day: bool,
    pub note: Option<String>,
    pub slots: Vec<Slot>,
}

impl CalendarDay {
    #[cfg(test)]
    pub fn slot(&self, start_time: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.start_time == start_time)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationRow {
    pub id: String,
    pub user_id: String,
    pub doctor_id: String,
    pub pet_id: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub symptoms: Json<Vec<String>>,
    pub urgency: Urgency,
    pub notes: Option<String>,
    pub status: ReservationStatus,
    pub consultation_fee: f64,
    pub additional_charges: f64,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const RESERVATION_COLUMNS: &str = "id, user_id, doctor_id, pet_id, appointment_date, \
    appointment_time, appointment_type, reason, symptoms, urgency, notes, status, \
    consultation_fee, additional_charges, total_amount, payment_status, cancelled_by, \
    cancelled_at, cancellation_reason, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub consultation_fee: f64,
    pub additional_charges: f64,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
}

impl Fees {
    pub fn new(consultation_fee: f64, additional_charges: f64) -> Self {
        Self {
            consultation_fee,
            additional_charges,
            total_amount: consultation_fee + additional_charges,
            payment_status: PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_by: String,
    pub cancelled_at: String,
    pub reason: Option<String>,
}

/// Reservation as handed back to API callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub doctor_id: String,
    pub pet_id: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub symptoms: Vec<String>,
    pub urgency: Urgency,
    pub notes: Option<String>,
    pub status: ReservationStatus,
    pub fees: Fees,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        let cancellation = match (row.status, row.cancelled_by, row.cancelled_at) {
            (ReservationStatus::Cancelled, Some(cancelled_by), Some(cancelled_at)) => {
                Some(Cancellation {
                    cancelled_by,
                    cancelled_at,
                    reason: row.cancellation_reason,
                })
            }
            _ => None,
        };
        Self {
            id: row.id,
            user_id: row.user_id,
            doctor_id: row.doctor_id,
            pet_id: row.pet_id,
            appointment_date: row.appointment_date,
            appointment_time: row.appointment_time,
            appointment_type: row.appointment_type,
            reason: row.reason,
            symptoms: row.symptoms.0,
            urgency: row.urgency,
            notes: row.notes,
            status: row.status,
            fees: Fees {
                consultation_fee: row.consultation_fee,
                additional_charges: row.additional_charges,
                total_amount: row.total_amount,
                payment_status: row.payment_status,
            },
            cancellation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub kind: String,
    pub message: String,
    pub created_at: String,
    pub user_id: Option<String>,
    pub reservation_id: Option<String>,
}
