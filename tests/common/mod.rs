// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use forum_backend::{
    config::Config, routes, state::AppState, utils::storage::LocalImageStore,
};
use reqwest::{Client, Response, multipart};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tempfile::TempDir;

pub const PASSWORD: &str = "Passw0rdX";

/// PNG signature plus the start of an IHDR chunk; enough for type sniffing.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: Client,
    pub upload_dir: TempDir,
}

pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub token: String,
}

pub fn test_config(database_url: &str, upload_dir: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        upload_dir: upload_dir.to_string(),
        max_upload_bytes: 5 * 1024 * 1024,
        cors_origins: vec!["http://localhost:5173".to_string()],
        admin_username: None,
        admin_password: None,
        admin_email: None,
    }
}

/// Spawns the app on a random port against `DATABASE_URL`.
/// Tests using it are `#[ignore]`d; run them with `cargo test -- --ignored`.
pub async fn spawn_app() -> TestApp {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let upload_dir = tempfile::tempdir().expect("temp upload dir");
    let upload_path = upload_dir.path().to_string_lossy().to_string();

    let state = AppState {
        pool: pool.clone(),
        config: test_config(&database_url, &upload_path),
        images: Arc::new(LocalImageStore::new(&upload_path, "/images")),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: Client::new(),
        upload_dir,
    }
}

pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, prefix: &str) -> TestUser {
        let username = unique(prefix);
        let response = self
            .client
            .post(self.url("/user"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("Register failed");
        assert_eq!(response.status().as_u16(), 201, "register {username}");
        let id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

        let token = self.login(&username).await;
        TestUser { id, username, token }
    }

    pub async fn login(&self, username: &str) -> String {
        let body = self
            .client
            .post(self.url("/user/login"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("Login failed")
            .json::<Value>()
            .await
            .expect("Failed to parse login json");
        body["token"].as_str().expect("Token not found").to_string()
    }

    /// Promotes a user directly in the database and returns a fresh token.
    pub async fn promote(&self, user: &TestUser, role: &str) -> String {
        sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role)
            .bind(user.id)
            .execute(&self.pool)
            .await
            .unwrap();
        self.login(&user.username).await
    }

    pub async fn create_post(&self, token: &str, title: &str, category: &str) -> Value {
        self.create_post_with_images(token, title, category, 0).await
    }

    pub async fn create_post_with_images(
        &self,
        token: &str,
        title: &str,
        category: &str,
        images: usize,
    ) -> Value {
        let mut form = multipart::Form::new()
            .text("title", title.to_string())
            .text("content", "Some content")
            .text("category", category.to_string());
        for i in 0..images {
            form = form.part(
                "newImages",
                multipart::Part::bytes(PNG.to_vec()).file_name(format!("img{i}.png")),
            );
        }

        let response = self
            .client
            .post(self.url("/post"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> Value {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        assert!(response.status().is_success(), "GET {path}");
        response.json().await.unwrap()
    }

    pub async fn score(&self, post_id: i64) -> i64 {
        self.get(&format!("/post/{post_id}?scoreOnly=true")).await["score"]
            .as_i64()
            .unwrap()
    }

    pub async fn comments_count(&self, post_id: i64) -> i64 {
        self.get(&format!("/post/{post_id}")).await["commentsCount"]
            .as_i64()
            .unwrap()
    }
}
