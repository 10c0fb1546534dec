use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::auth::dto::UpdateProfileRequest;

/// User record in the database. `password_hash` is null for accounts
/// provisioned through OAuth and is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<Date>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub current_medications: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
}

const COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
                       date_of_birth, address, phone_number, allergies, \
                       chronic_conditions, current_medications, date_joined";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM users
            WHERE email = $1
            "#
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM users
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Disjunctive collision check: either a username or an email match
    /// blocks registration.
    pub async fn username_or_email_taken(
        db: &PgPool,
        username: &str,
        email: &str,
    ) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users WHERE username = $1 OR email = $2
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(db)
        .await?;
        Ok(taken)
    }

    /// Create a password-registered user. Returns `sqlx::Error` so callers
    /// can map unique violations to a conflict response.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Provision an OAuth-only account: null password, names as supplied by
    /// the provider. Callers must have looked up the email first.
    pub async fn create_oauth(
        db: &PgPool,
        username: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, NULL, $3, $4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(db)
        .await
    }

    /// Sparse profile update in a single atomic statement; absent fields keep
    /// their current value. Returns `None` when the user row is gone.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        patch: &UpdateProfileRequest,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username            = COALESCE($2, username),
                email               = COALESCE($3, email),
                first_name          = COALESCE($4, first_name),
                last_name           = COALESCE($5, last_name),
                date_of_birth       = COALESCE($6, date_of_birth),
                address             = COALESCE($7, address),
                phone_number        = COALESCE($8, phone_number),
                allergies           = COALESCE($9, allergies),
                chronic_conditions  = COALESCE($10, chronic_conditions),
                current_medications = COALESCE($11, current_medications)
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.username.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.date_of_birth)
        .bind(patch.address.as_deref())
        .bind(patch.phone_number.as_deref())
        .bind(patch.allergies.as_deref())
        .bind(patch.chronic_conditions.as_deref())
        .bind(patch.current_medications.as_deref())
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
