// src/models/user.rs

use std::{str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::error::AppError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@([\w-]+\.)+\w+$").expect("valid email regex"));

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Unique e-mail address.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// User role: 'user', 'moderator' or 'admin'.
    pub role: String,

    pub bio: String,
    pub avatar_name: String,
    pub avatar_url: String,
    pub is_banned: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::BadRequest(format!("Unknown role '{other}'"))),
        }
    }
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(regex(path = *EMAIL_RE, message = "Email is not in a valid format."))]
    pub email: String,
    #[validate(custom(function = validate_password))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Password policy: 8 to 30 characters with a digit, a lowercase and an
/// uppercase letter.
fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    let strong = (8..=30).contains(&len)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase());

    if strong {
        Ok(())
    } else {
        Err(ValidationError::new("weak_password").with_message(
            "Password must be 8 to 30 characters long and contain at least one uppercase letter, one lowercase letter and one digit."
                .into(),
        ))
    }
}

pub fn check_password(password: &str) -> Result<(), AppError> {
    validate_password(password).map_err(|e| {
        AppError::BadRequest(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Invalid password".to_string()),
        )
    })
}

pub fn check_email(email: &str) -> Result<(), AppError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Email is not in a valid format.".to_string()))
    }
}

/// Response returned by the ban toggle.
#[derive(Debug, Serialize)]
pub struct BanResponse {
    pub message: String,
    pub user: User,
}
