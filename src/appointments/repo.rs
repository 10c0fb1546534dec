use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::appointments::slots::TimeSlot;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
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

const COLUMNS: &str = "id, user_id, doctor_name, appointment_date, appointment_time, \
                       time_slot, reason, status, created_at, updated_at";

impl Appointment {
    /// Latest booked time for a (date, slot) pair, or `None` when the slot
    /// is empty. Optionally excludes one appointment's own row (used when
    /// re-allocating on update). Allocation works from this high-water mark
    /// rather than a row count, so deleting an earlier booking can never
    /// steer the next allocation onto a time that is still taken.
    pub async fn last_time_for_slot(
        db: &PgPool,
        date: Date,
        slot: TimeSlot,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Option<Time>> {
        let last = sqlx::query_scalar::<_, Option<Time>>(
            r#"
            SELECT MAX(appointment_time)
            FROM appointments
            WHERE appointment_date = $1
              AND time_slot = $2
              AND ($3::uuid IS NULL OR id <> $3)
            "#,
        )
        .bind(date)
        .bind(slot)
        .bind(exclude)
        .fetch_one(db)
        .await?;
        Ok(last)
    }

    /// Returns `sqlx::Error` so callers can map unique-constraint violations
    /// (two bookings racing onto the same computed time) to a business error.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        doctor_name: &str,
        date: Date,
        slot: TimeSlot,
        time: Time,
        reason: Option<&str>,
    ) -> Result<Appointment, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        sqlx::query_as::<_, Appointment>(&format!(
            r#"
            INSERT INTO appointments
                (user_id, doctor_name, appointment_date, appointment_time,
                 time_slot, reason, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(doctor_name)
        .bind(date)
        .bind(time)
        .bind(slot)
        .bind(reason)
        .bind(now)
        .fetch_one(db)
        .await
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM appointments
            ORDER BY appointment_date, appointment_time
            "#
        ))
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Point lookup restricted to the owner. A non-owner gets `None`, same as
    /// a missing id.
    pub async fn find_owned(
        db: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM appointments
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Persist the merged state of an update in one statement. `updated_at`
    /// is always refreshed.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_update(
        db: &PgPool,
        id: Uuid,
        doctor_name: &str,
        date: Date,
        slot: TimeSlot,
        time: Time,
        reason: Option<&str>,
    ) -> Result<Appointment, sqlx::Error> {
        sqlx::query_as::<_, Appointment>(&format!(
            r#"
            UPDATE appointments
            SET doctor_name = $2,
                appointment_date = $3,
                appointment_time = $4,
                time_slot = $5,
                reason = $6,
                updated_at = $7
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(doctor_name)
        .bind(date)
        .bind(time)
        .bind(slot)
        .bind(reason)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db)
        .await
    }

    pub async fn delete_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM appointments
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
