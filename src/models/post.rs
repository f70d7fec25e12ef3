use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::{
    models::{comment::CommentResponse, image::Image},
    utils::{html::clean_html, upload::FormData},
};

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub images: Json<Vec<Image>>,

    /// Sum of all live votes on this post.
    pub score: i32,
    /// Number of live comments on this post.
    pub comments_count: i32,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A post joined with its author's username.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PostWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: Post,
    pub username: String,
}

/// Full view of a single post.
#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostWithAuthor,
    pub comments: Vec<CommentResponse>,
}

/// Validated text fields of a post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct PostFields {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content length must be between 1 and 10000 chars"
    ))]
    pub content: String,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Category length must be between 1 and 50 chars"
    ))]
    pub category: String,
}

impl PostFields {
    /// Reads the fields of a create form; missing values become empty and
    /// are caught by validation.
    pub fn from_form(form: &FormData) -> Self {
        Self {
            title: form.text("title").unwrap_or_default().to_string(),
            content: clean_html(form.text("content").unwrap_or_default()),
            category: form.text("category").unwrap_or_default().to_string(),
        }
    }
}

/// Sparse update of a post: only present fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

impl PostPatch {
    pub fn from_form(form: &FormData) -> Self {
        Self {
            title: form.text("title").map(str::to_string),
            content: form.text("content").map(clean_html),
            category: form.text("category").map(str::to_string),
        }
    }

    pub fn apply(self, post: &Post) -> PostFields {
        PostFields {
            title: self.title.unwrap_or_else(|| post.title.clone()),
            content: self.content.unwrap_or_else(|| post.content.clone()),
            category: self.category.unwrap_or_else(|| post.category.clone()),
        }
    }
}

/// Splits `current` into images to keep and images to drop.
///
/// `retained` lists names or URLs; `None` keeps everything.
pub fn partition_images(current: &[Image], retained: Option<&[String]>) -> (Vec<Image>, Vec<Image>) {
    match retained {
        None => (current.to_vec(), Vec::new()),
        Some(refs) => current
            .iter()
            .cloned()
            .partition(|img| refs.iter().any(|r| img.is_referenced_by(r))),
    }
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListParams {
    /// 1-based page number (default: 1).
    pub page: Option<i64>,

    /// Number of items per page (default: 10, max: 100).
    pub limit: Option<i64>,

    /// 'date' (default), 'name', 'score' or 'commentsNum'.
    pub sort_by: Option<String>,

    /// 'asc' or 'desc' (default).
    pub ord: Option<String>,

    /// Restrict to a single category.
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<PostWithAuthor>,
    pub total_posts: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub posts_per_page: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPostParams {
    #[serde(default)]
    pub score_only: bool,
}
