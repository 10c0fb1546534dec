use serde::{de, Deserialize, Deserializer, Serialize};
use time::{macros::format_description, Date};
use uuid::Uuid;

use crate::auth::repo::User;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Bearer token issued on login (password or OAuth).
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
        }
    }
}

/// Public part of the user returned to the client. Never carries the hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<Date>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub current_medications: Option<String>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            date_of_birth: u.date_of_birth,
            address: u.address,
            phone_number: u.phone_number,
            allergies: u.allergies,
            chronic_conditions: u.chronic_conditions,
            current_medications: u.current_medications,
        }
    }
}

/// Sparse profile patch. Absent (and unknown) fields are ignored; an empty
/// date-of-birth string clears nothing and is treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub date_of_birth: Option<Date>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub current_medications: Option<String>,
}

fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => {
            let format = format_description!("[year]-[month]-[day]");
            Date::parse(s, &format)
                .map(Some)
                .map_err(|_| de::Error::custom("date_of_birth must be YYYY-MM-DD"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn profile_never_serializes_a_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "somchai42".into(),
            email: "somchai@example.com".into(),
            password_hash: Some("argon2-hash".into()),
            first_name: None,
            last_name: None,
            date_of_birth: None,
            address: None,
            phone_number: None,
            allergies: None,
            chronic_conditions: None,
            current_medications: None,
            date_joined: datetime!(2024-01-01 00:00 UTC),
        };
        let profile = UserProfile::from(user);
        let json = serde_json::to_string(&profile).expect("serialize");
        assert!(!json.contains("argon2-hash"));
        assert!(!json.contains("password"));
        assert!(json.contains("somchai@example.com"));
    }

    #[test]
    fn patch_accepts_iso_date_of_birth() {
        let patch: UpdateProfileRequest =
            serde_json::from_str(r#"{"date_of_birth": "1990-03-15"}"#).expect("valid patch");
        assert_eq!(patch.date_of_birth, Some(date!(1990 - 03 - 15)));
    }

    #[test]
    fn patch_treats_empty_date_of_birth_as_absent() {
        let patch: UpdateProfileRequest =
            serde_json::from_str(r#"{"date_of_birth": ""}"#).expect("valid patch");
        assert_eq!(patch.date_of_birth, None);
    }

    #[test]
    fn patch_rejects_malformed_date_of_birth() {
        assert!(serde_json::from_str::<UpdateProfileRequest>(r#"{"date_of_birth": "15/03/1990"}"#)
            .is_err());
    }

    #[test]
    fn patch_ignores_unknown_fields() {
        let patch: UpdateProfileRequest =
            serde_json::from_str(r#"{"phone_number": "0812345678", "favorite_color": "green"}"#)
                .expect("unknown fields are ignored");
        assert_eq!(patch.phone_number.as_deref(), Some("0812345678"));
    }

    #[test]
    fn token_response_is_bearer() {
        let json = serde_json::to_string(&TokenResponse::bearer("abc".into())).expect("serialize");
        assert!(json.contains("\"token_type\":\"bearer\""));
    }
}
