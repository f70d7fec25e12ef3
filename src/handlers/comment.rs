// src/handlers/comment.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::user::require_active_user,
    models::comment::{
        Comment, CommentListParams, CommentResponse, CreateCommentRequest, UpdateCommentRequest,
    },
    utils::{html::clean_html, jwt::Claims},
};

const COMMENT_COLUMNS: &str = "id, post_id, user_id, content, created_at, updated_at";

/// List comments, optionally for a single post.
pub async fn list_comments(
    State(pool): State<PgPool>,
    Query(params): Query<CommentListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_comments(&pool, params.post_id).await?))
}

/// Comments oldest first, each with its author's username.
pub(crate) async fn fetch_comments(
    pool: &PgPool,
    post_id: Option<i64>,
) -> Result<Vec<CommentResponse>, AppError> {
    let comments = sqlx::query_as::<_, CommentResponse>(
        r#"
        SELECT
            c.id, c.post_id, c.user_id, u.username, c.content,
            c.created_at, c.updated_at
        FROM comments c
        JOIN users u ON c.user_id = u.id
        WHERE ($1::BIGINT IS NULL OR c.post_id = $1)
        ORDER BY c.created_at ASC, c.id ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(comments)
}

/// Create a new comment.
/// Inserting the row and bumping the post's counter happen in one transaction.
pub async fn create_comment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = CreateCommentRequest {
        content: clean_html(&payload.content),
        ..payload
    };
    payload.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    // 1. Author must exist (and not be banned)
    require_active_user(&mut *tx, user_id, "Comment author does not exist").await?;

    // 2. Update Post Count
    sqlx::query_scalar::<_, i64>(
        "UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1 RETURNING id",
    )
    .bind(payload.post_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Comment post does not exist".to_string()))?;

    // 3. Insert Comment
    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"
        INSERT INTO comments (post_id, user_id, content)
        VALUES ($1, $2, $3)
        RETURNING {COMMENT_COLUMNS}
        "#
    ))
    .bind(payload.post_id)
    .bind(user_id)
    .bind(&payload.content)
    .fetch_one(&mut *tx)
    .await?;

    let response = with_username(&mut tx, comment).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Edit a comment's content.
/// Requires: comment author.
pub async fn update_comment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = UpdateCommentRequest {
        content: clean_html(&payload.content),
    };
    payload.validate()?;
    let user_id = claims.user_id()?;
    require_active_user(&pool, user_id, "Your account no longer exists").await?;

    let author = sqlx::query_scalar::<_, i64>("SELECT user_id FROM comments WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Comment does not exist".to_string()))?;

    if author != user_id {
        return Err(AppError::Forbidden(
            "You can only edit your own comments".to_string(),
        ));
    }

    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"
        UPDATE comments
        SET content = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING {COMMENT_COLUMNS}
        "#
    ))
    .bind(&payload.content)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Comment does not exist".to_string()))?;

    Ok(Json(comment))
}

/// Delete a comment and decrement its post's counter.
/// Requires: comment author, moderator or admin.
pub async fn delete_comment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, claims.user_id()?, "Your account no longer exists").await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Comment does not exist".to_string()))?;

    if !claims.owns_or_moderates(comment.user_id) {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this comment".to_string(),
        ));
    }

    sqlx::query_scalar::<_, i64>(
        "UPDATE posts SET comments_count = comments_count - 1 WHERE id = $1 RETURNING id",
    )
    .bind(comment.post_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Comment post does not exist".to_string()))?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Comment {} removed from post {}", id, comment.post_id);

    Ok(StatusCode::NO_CONTENT)
}

async fn with_username(conn: &mut PgConnection, comment: Comment) -> Result<CommentResponse, AppError> {
    let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
        .bind(comment.user_id)
        .fetch_one(conn)
        .await?;

    Ok(CommentResponse {
        id: comment.id,
        post_id: comment.post_id,
        user_id: comment.user_id,
        username,
        content: comment.content,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    })
}
