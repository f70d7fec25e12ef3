// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{auth, comment, post as posts, user, vote},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (post, comment, vote, user).
/// * Serves uploaded images under `/images`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_login = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let post_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/{id}", get(posts::get_post))
        // Protected post routes
        .merge(
            Router::new()
                .route("/", post(posts::create_post))
                .route("/{id}", put(posts::update_post).delete(posts::delete_post))
                .route_layer(require_login.clone()),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    let comment_routes = Router::new()
        .route("/", get(comment::list_comments))
        .merge(
            Router::new()
                .route("/", post(comment::create_comment))
                .route(
                    "/{id}",
                    put(comment::update_comment).delete(comment::delete_comment),
                )
                .route_layer(require_login.clone()),
        );

    let vote_routes = Router::new()
        .route("/", get(vote::list_votes))
        .merge(
            Router::new()
                .route("/", post(vote::cast_vote))
                .route("/{id}", put(vote::change_vote).delete(vote::retract_vote))
                .route_layer(require_login.clone()),
        );

    let user_routes = Router::new()
        .route("/", get(user::list_users).post(auth::register))
        .route("/login", post(auth::login))
        .route("/{id}", get(user::get_user))
        .merge(
            Router::new()
                .route("/{id}", put(user::update_user).delete(user::delete_user))
                .route_layer(require_login.clone()),
        )
        // Staff only: Auth first, then role check
        .merge(
            Router::new()
                .route("/toggle-ban/{id}", patch(user::toggle_ban))
                .route_layer(middleware::from_fn(staff_middleware))
                .route_layer(require_login),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .nest("/post", post_routes)
        .nest("/comment", comment_routes)
        .nest("/vote", vote_routes)
        .nest("/user", user_routes)
        .nest_service("/images", ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
