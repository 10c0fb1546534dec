use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::appointments::repo::Appointment;
use crate::appointments::slots::TimeSlot;

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub appointment_date: Date,
    pub time_slot: TimeSlot,
    pub reason: Option<String>,
    pub doctor_name: Option<String>,
}

/// Sparse patch. Absent fields are left unchanged; a date or slot change
/// triggers re-allocation of the appointment time.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<Date>,
    pub time_slot: Option<TimeSlot>,
    pub reason: Option<String>,
    pub doctor_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentOut {
    pub id: Uuid,
    pub user_id: Uuid,
    pub doctor_name: String,
    pub appointment_date: Date,
    pub appointment_time: Time,
    pub time_slot: TimeSlot,
    pub reason: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Appointment> for AppointmentOut {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            doctor_name: a.doctor_name,
            appointment_date: a.appointment_date,
            appointment_time: a.appointment_time,
            time_slot: a.time_slot,
            reason: a.reason,
            status: a.status,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_parses_date_and_slot() {
        let req: CreateAppointmentRequest = serde_json::from_str(
            r#"{"appointment_date": "2024-06-01", "time_slot": "morning", "reason": "checkup"}"#,
        )
        .expect("valid request");
        assert_eq!(req.time_slot, TimeSlot::Morning);
        assert_eq!(req.appointment_date.to_string(), "2024-06-01");
        assert_eq!(req.reason.as_deref(), Some("checkup"));
        assert!(req.doctor_name.is_none());
    }

    #[test]
    fn update_request_ignores_unknown_fields() {
        let req: UpdateAppointmentRequest = serde_json::from_str(
            r#"{"reason": "follow-up", "appointment_time": "09:00:00", "nonsense": true}"#,
        )
        .expect("unknown fields are dropped, not rejected");
        assert_eq!(req.reason.as_deref(), Some("follow-up"));
        assert!(req.appointment_date.is_none());
        assert!(req.time_slot.is_none());
    }

    #[test]
    fn bad_slot_label_is_rejected() {
        let res = serde_json::from_str::<CreateAppointmentRequest>(
            r#"{"appointment_date": "2024-06-01", "time_slot": "evening"}"#,
        );
        assert!(res.is_err());
    }
}
