// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, unique_violation},
    handlers::user::USER_COLUMNS,
    models::user::{CreateUserRequest, LoginRequest, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, email, password)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&hashed_password)
    .fetch_one(&pool)
    .await
    .map_err(|e| match unique_violation(&e) {
        Some(constraint) if constraint.contains("email") => {
            AppError::Conflict(format!("Email '{}' is already taken", payload.email))
        }
        Some(_) => AppError::Conflict(format!("Username '{}' is already taken", payload.username)),
        None => {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    tracing::info!("Registered user {} ({})", user.id, user.username);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Banned accounts are refused even with the right password.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::from(e)
    })?
    .ok_or(AppError::AuthError("Wrong username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Wrong username or password".to_string()));
    }

    if user.is_banned {
        return Err(AppError::AuthError("This account has been banned".to_string()));
    }

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user,
    })))
}
