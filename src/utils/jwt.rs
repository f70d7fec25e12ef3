// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::user::Role};

/// JWT Claims structure.
///
/// Injected into request extensions by `auth_middleware`; handlers receive it
/// as the authenticated principal of the request.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role ('user', 'moderator' or 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    /// Moderators and admins.
    pub fn is_staff(&self) -> bool {
        self.role().is_staff()
    }

    /// True when the principal is `owner_id` or has staff rights.
    pub fn owns_or_moderates(&self, owner_id: i64) -> bool {
        self.user_id().is_ok_and(|id| id == owner_id) || self.is_staff()
    }
}

/// Signs a new JWT for the user.
pub fn sign_jwt(
    id: i64,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects `Claims`
/// into the request extensions. Missing or invalid tokens yield 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("You must be logged in".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum Middleware: Staff Authorization.
///
/// Must be used AFTER `auth_middleware`. Lets moderators and admins through.
pub async fn staff_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("You must be logged in".to_string()))?;

    if !claims.is_staff() {
        return Err(AppError::Forbidden(
            "Only moderators and administrators may do this".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
