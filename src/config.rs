// src/config.rs

use std::env;
use dotenvy::dotenv;
use url::Url;

/// Hard cap on images attached to a single post.
pub const MAX_POST_IMAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    /// Directory where uploaded images are written and served from.
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let upload_dir = env::var("UPLOAD_DIR")
            .unwrap_or_else(|_| "public/images".to_string());

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20 * 1024 * 1024);

        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".to_string()),
        );

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            upload_dir,
            max_upload_bytes,
            cors_origins,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
        }
    }
}

/// Splits a comma separated origin list, keeping only well-formed http(s) origins.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Some(url.origin().ascii_serialization())
            }
            _ => {
                tracing::warn!("Ignoring invalid CORS origin: {}", s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_normalized_and_filtered() {
        let origins = parse_origins("http://localhost:5173/, ftp://x.y, nonsense,https://forum.example.com");
        assert_eq!(
            origins,
            vec!["http://localhost:5173".to_string(), "https://forum.example.com".to_string()]
        );
    }
}
