use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use time::Date;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::appointments::dto::{AppointmentOut, CreateAppointmentRequest, UpdateAppointmentRequest};
use crate::appointments::repo::Appointment;
use crate::appointments::slots::{next_after, TimeSlot};
use crate::auth::jwt::AuthUser;
use crate::error::{is_unique_violation, ApiError};
use crate::state::AppState;

/// Label used when a booking does not name a doctor.
pub const DEFAULT_DOCTOR: &str = "Duty doctor";

const NOT_FOUND_MSG: &str = "Appointment not found";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments))
        .route("/appointments/:id", get(get_appointment))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment))
        .route(
            "/appointments/:id",
            axum::routing::put(update_appointment).delete(delete_appointment),
        )
}

#[instrument(skip(state, body))]
pub async fn create_appointment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentOut>), ApiError> {
    let last =
        Appointment::last_time_for_slot(&state.db, body.appointment_date, body.time_slot, None)
            .await?;
    let time = next_after(body.time_slot, last)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let doctor_name = resolve_doctor(body.doctor_name, DEFAULT_DOCTOR);
    let appointment = Appointment::create(
        &state.db,
        user_id,
        &doctor_name,
        body.appointment_date,
        body.time_slot,
        time,
        body.reason.as_deref(),
    )
    .await
    .map_err(slot_taken_or_db)?;

    info!(
        appointment_id = %appointment.id,
        user_id = %user_id,
        slot = %appointment.time_slot,
        time = %appointment.appointment_time,
        "appointment created"
    );
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

/// Returns every appointment in the system to any authenticated caller.
/// Deliberately unfiltered; the clinic front desk works off the full list.
#[instrument(skip(state))]
pub async fn list_appointments(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<AppointmentOut>>, ApiError> {
    let rows = Appointment::list_all(&state.db).await?;
    Ok(Json(rows.into_iter().map(AppointmentOut::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_appointment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AppointmentOut>, ApiError> {
    let appointment = Appointment::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MSG.into()))?;
    Ok(Json(appointment.into()))
}

#[instrument(skip(state, body))]
pub async fn update_appointment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentOut>, ApiError> {
    let current = Appointment::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(NOT_FOUND_MSG.into()))?;

    // A date or slot change re-allocates the time against the target pair's
    // high-water mark, ignoring this appointment's own row. Fails before any
    // other field is touched.
    let (date, slot, time) = match target_schedule(&current, &body) {
        Some((date, slot)) => {
            let last =
                Appointment::last_time_for_slot(&state.db, date, slot, Some(current.id)).await?;
            let time =
                next_after(slot, last).map_err(|e| ApiError::Validation(e.to_string()))?;
            (date, slot, time)
        }
        None => (
            current.appointment_date,
            current.time_slot,
            current.appointment_time,
        ),
    };

    let doctor_name = resolve_doctor(body.doctor_name, &current.doctor_name);
    let reason = match body.reason.filter(|r| !r.trim().is_empty()) {
        Some(r) => Some(r),
        None => current.reason.clone(),
    };

    let updated = Appointment::save_update(
        &state.db,
        current.id,
        &doctor_name,
        date,
        slot,
        time,
        reason.as_deref(),
    )
    .await
    .map_err(slot_taken_or_db)?;

    info!(appointment_id = %updated.id, user_id = %user_id, "appointment updated");
    Ok(Json(updated.into()))
}

#[instrument(skip(state))]
pub async fn delete_appointment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let deleted = Appointment::delete_owned(&state.db, id, user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(NOT_FOUND_MSG.into()));
    }
    info!(appointment_id = %id, user_id = %user_id, "appointment deleted");
    Ok(Json(json!({ "detail": "Appointment deleted" })))
}

/// The (date, slot) pair to re-allocate against, or `None` when neither
/// changed and the existing time must be kept as-is.
fn target_schedule(
    current: &Appointment,
    patch: &UpdateAppointmentRequest,
) -> Option<(Date, TimeSlot)> {
    if patch.appointment_date.is_none() && patch.time_slot.is_none() {
        return None;
    }
    Some((
        patch.appointment_date.unwrap_or(current.appointment_date),
        patch.time_slot.unwrap_or(current.time_slot),
    ))
}

fn resolve_doctor(patch: Option<String>, fallback: &str) -> String {
    match patch.filter(|d| !d.trim().is_empty()) {
        Some(d) => d,
        None => fallback.to_string(),
    }
}

/// The unique index on (date, slot, time) is the backstop for two requests
/// racing onto the same high-water mark; the loser gets a conflict instead
/// of a duplicate time.
fn slot_taken_or_db(e: sqlx::Error) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::Conflict("That time was just booked, please try again".into())
    } else {
        ApiError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    fn sample() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            doctor_name: "Dr. Somchai".into(),
            appointment_date: date!(2024 - 06 - 01),
            appointment_time: time!(8:30),
            time_slot: TimeSlot::Morning,
            reason: Some("checkup".into()),
            status: "pending".into(),
            created_at: datetime!(2024-05-20 10:00 UTC),
            updated_at: datetime!(2024-05-20 10:00 UTC),
        }
    }

    #[test]
    fn reason_only_patch_keeps_the_schedule() {
        let patch = UpdateAppointmentRequest {
            reason: Some("follow-up".into()),
            ..Default::default()
        };
        assert_eq!(target_schedule(&sample(), &patch), None);
    }

    #[test]
    fn slot_change_reuses_the_current_date() {
        let patch = UpdateAppointmentRequest {
            time_slot: Some(TimeSlot::Afternoon),
            ..Default::default()
        };
        assert_eq!(
            target_schedule(&sample(), &patch),
            Some((date!(2024 - 06 - 01), TimeSlot::Afternoon))
        );
    }

    #[test]
    fn date_change_reuses_the_current_slot() {
        let patch = UpdateAppointmentRequest {
            appointment_date: Some(date!(2024 - 06 - 02)),
            ..Default::default()
        };
        assert_eq!(
            target_schedule(&sample(), &patch),
            Some((date!(2024 - 06 - 02), TimeSlot::Morning))
        );
    }

    #[test]
    fn empty_doctor_patch_falls_back() {
        assert_eq!(resolve_doctor(None, DEFAULT_DOCTOR), DEFAULT_DOCTOR);
        assert_eq!(resolve_doctor(Some("   ".into()), "Dr. Somying"), "Dr. Somying");
        assert_eq!(
            resolve_doctor(Some("Dr. Damrong".into()), DEFAULT_DOCTOR),
            "Dr. Damrong"
        );
    }
}
