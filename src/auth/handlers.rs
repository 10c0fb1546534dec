use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::auth::{
    dto::{LoginRequest, RegisterRequest, TokenResponse, UpdateProfileRequest, UserProfile},
    jwt::{AuthUser, JwtKeys},
    password::{hash_password, verify_password},
    repo::User,
};
use crate::error::{is_unique_violation, ApiError};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9]{3,20}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).delete(delete_me))
        .route("/me/profile", put(update_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err(ApiError::Validation(
            "Username must be 3-20 alphanumeric characters".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.chars().count() < 6 {
        warn!("password too short");
        return Err(ApiError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }

    // Either collision blocks registration.
    if User::username_or_email_taken(&state.db, &payload.username, &payload.email).await? {
        warn!(username = %payload.username, email = %payload.email, "registration collision");
        return Err(ApiError::Conflict(
            "Username or email already registered".into(),
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.username, &payload.email, &hash)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Username or email already registered".into())
            } else {
                ApiError::Database(e)
            }
        })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // Unknown email, OAuth-only account and wrong password all collapse into
    // one answer so the response never reveals which part was wrong.
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(invalid());
        }
    };
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "login attempt against oauth-only account");
        return Err(invalid());
    };
    if !verify_password(&payload.password, hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse::bearer(token)))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(mut payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    if let Some(username) = payload.username.as_deref() {
        if !is_valid_username(username) {
            return Err(ApiError::Validation(
                "Username must be 3-20 alphanumeric characters".into(),
            ));
        }
    }
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !is_valid_email(email) {
            return Err(ApiError::Validation("Invalid email".into()));
        }
    }

    let user = User::update_profile(&state.db, user_id, &payload)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Username or email already registered".into())
            } else {
                ApiError::Database(e)
            }
        })?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Value>, ApiError> {
    if !User::delete(&state.db, user_id).await? {
        return Err(ApiError::Unauthorized("User not found".into()));
    }
    info!(user_id = %user_id, "user deleted");
    Ok(Json(json!({ "detail": "User deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("somchai@example.com"));
        assert!(is_valid_email("a.b+c@clinic.co.th"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn username_must_be_three_to_twenty_alphanumerics() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("Somchai42"));
        assert!(is_valid_username("a2345678901234567890"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("a23456789012345678901"));
        assert!(!is_valid_username("with space"));
        assert!(!is_valid_username("under_score"));
        assert!(!is_valid_username(""));
    }
}
