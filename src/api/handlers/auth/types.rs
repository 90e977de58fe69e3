//! Request/response types for user endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::storage::User;

// Password-bearing bodies skip Debug so plaintext never reaches a log line.

#[derive(ToSchema, Deserialize)]
pub struct RegistrationRequest {
    pub user: NewUserBody,
}

#[derive(ToSchema, Deserialize)]
pub struct NewUserBody {
    pub email: String,
    pub username: String,
    #[schema(format = Password)]
    pub password: String,
}

impl NewUserBody {
    #[must_use]
    pub fn password(&self) -> SecretString {
        SecretString::from(self.password.clone())
    }
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub user: LoginBody,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginBody {
    pub email: String,
    #[schema(format = Password)]
    pub password: String,
}

impl LoginBody {
    #[must_use]
    pub fn password(&self) -> SecretString {
        SecretString::from(self.password.clone())
    }
}

/// `{"user": {<column>: <value>, ...}}`; keys are checked against the allow-list.
#[derive(ToSchema, Deserialize, Debug)]
pub struct UpdateUserRequest {
    #[schema(value_type = Object)]
    pub user: Map<String, Value>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub user: UserBody,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    pub email: String,
    pub token: Option<String>,
    pub username: String,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub message: String,
}

fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl UserResponse {
    #[must_use]
    pub fn new(user: User, token: Option<String>) -> Self {
        Self {
            user: UserBody {
                email: user.email,
                token,
                username: user.username,
                bio: user.bio,
                created_at: iso8601(user.created_at),
                updated_at: iso8601(user.updated_at),
            },
        }
    }
}
