// src/main.rs

use std::{net::SocketAddr, sync::Arc, time::Duration};

use dotenvy::dotenv;
use forum_backend::{
    config::Config,
    routes,
    state::AppState,
    utils::{hash::hash_password, storage::LocalImageStore},
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let images = LocalImageStore::new(&config.upload_dir, "/images");
    if let Err(e) = tokio::fs::create_dir_all(images.root()).await {
        tracing::warn!("Could not create upload directory {}: {}", config.upload_dir, e);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState {
        pool,
        config,
        images: Arc::new(images),
    };

    let app = routes::create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    axum::serve(listener, app).await.expect("Server error");
}

async fn seed_admin_user(pool: &PgPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(username), Some(password), Some(email)) = (
        &config.admin_username,
        &config.admin_password,
        &config.admin_email,
    ) else {
        return Ok(());
    };

    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if exists.is_none() {
        tracing::info!("Seeding admin user: {}", username);
        let hashed_password = hash_password(password)?;

        sqlx::query("INSERT INTO users (username, email, password, role) VALUES ($1, $2, $3, 'admin')")
            .bind(username)
            .bind(email)
            .bind(hashed_password)
            .execute(pool)
            .await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}
