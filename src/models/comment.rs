use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: i64,

    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,
}

/// DTO for editing a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,
}

/// Query parameters for listing comments.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListParams {
    pub post_id: Option<i64>,
}

/// DTO for displaying a comment with author info.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
