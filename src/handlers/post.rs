// src/handlers/post.rs

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as DbJson};
use validator::Validate;

use crate::{
    config::MAX_POST_IMAGES,
    error::AppError,
    handlers::{comment::fetch_comments, user::require_active_user},
    models::{
        image::Image,
        post::{
            Post, PostDetail, PostFields, PostListParams, PostPage, PostPatch, PostWithAuthor,
            ShowPostParams, partition_images,
        },
    },
    utils::{
        jwt::Claims,
        pagination::PageRequest,
        storage::{ImageStore, SharedImageStore, discard_images},
        upload::FormData,
    },
};

const POST_COLUMNS: &str =
    "id, user_id, title, content, category, images, score, comments_count, created_at, updated_at";

const POST_WITH_AUTHOR: &str = r#"
    SELECT
        p.id, p.user_id, p.title, p.content, p.category, p.images,
        p.score, p.comments_count, p.created_at, p.updated_at,
        u.username
    FROM posts p
    JOIN users u ON p.user_id = u.id
"#;

/// List posts, one page at a time.
/// Supports `page`, `limit`, `sortBy`, `ord` and an optional `category`.
pub async fn list_posts(
    State(pool): State<PgPool>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = PageRequest::from_params(
        params.page,
        params.limit,
        params.sort_by.as_deref(),
        params.ord.as_deref(),
    )?;
    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let total_posts = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM posts WHERE ($1::TEXT IS NULL OR category = $1)",
    )
    .bind(category)
    .fetch_one(&pool)
    .await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_WITH_AUTHOR);
    if let Some(category) = category {
        builder.push(" WHERE p.category = ").push_bind(category);
    }
    builder.push(" ORDER BY ").push(page.sort.order_by());
    builder.push(" LIMIT ").push_bind(page.limit);
    builder.push(" OFFSET ").push_bind(page.skip);

    let posts = builder
        .build_query_as::<PostWithAuthor>()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list posts: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(PostPage {
        posts,
        total_posts,
        total_pages: page.total_pages(total_posts),
        current_page: page.page,
        posts_per_page: page.limit,
    }))
}

/// Get a single post by ID with its author and comments,
/// or only its score when `scoreOnly=true`.
pub async fn get_post(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Query(params): Query<ShowPostParams>,
) -> Result<Response, AppError> {
    if params.score_only {
        let score = sqlx::query_scalar::<_, i32>("SELECT score FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("No such post".to_string()))?;

        return Ok(Json(json!({ "score": score })).into_response());
    }

    let post = sqlx::query_as::<_, PostWithAuthor>(&format!("{POST_WITH_AUTHOR} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("No such post".to_string()))?;

    let comments = fetch_comments(&pool, Some(id)).await?;

    Ok(Json(PostDetail { post, comments }).into_response())
}

/// Create a new post from a multipart form.
/// Requires: Login. The author is the caller.
pub async fn create_post(
    State(pool): State<PgPool>,
    State(images): State<SharedImageStore>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = FormData::read(multipart).await?;

    // 1. Validate payload
    let fields = PostFields::from_form(&form);
    fields.validate()?;

    let uploads = form.files("newImages");
    if uploads.len() > MAX_POST_IMAGES {
        return Err(AppError::BadRequest(format!(
            "A post can have at most {MAX_POST_IMAGES} images"
        )));
    }

    let user_id = claims.user_id()?;
    require_active_user(&pool, user_id, "Post author does not exist").await?;

    // 2. Store images, then the row
    let saved = store_images(images.as_ref(), uploads).await?;

    let inserted = sqlx::query_as::<_, Post>(&format!(
        r#"
        INSERT INTO posts (user_id, title, content, category, images)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&fields.title)
    .bind(&fields.content)
    .bind(&fields.category)
    .bind(DbJson(&saved))
    .fetch_one(&pool)
    .await;

    match inserted {
        Ok(post) => {
            tracing::info!("User {} created post {}", user_id, post.id);
            Ok((StatusCode::CREATED, Json(post)))
        }
        Err(e) => {
            tracing::error!("Failed to create post: {:?}", e);
            discard_images(images.as_ref(), &image_names(&saved)).await;
            Err(e.into())
        }
    }
}

/// Update a post from a multipart form.
/// Requires: Login + (Author OR Staff).
///
/// Absent fields keep their value. When `existingImages` is sent, current
/// images missing from it are dropped and their files removed after the
/// update is stored.
pub async fn update_post(
    State(pool): State<PgPool>,
    State(images): State<SharedImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = FormData::read(multipart).await?;
    let retained: Option<Vec<String>> = form.json("existingImages")?;
    let uploads = form.files("newImages");

    require_active_user(&pool, claims.user_id()?, "Your account no longer exists").await?;

    // 1. Fetch Post to check ownership
    let current = sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("No such post".to_string()))?;

    if !claims.owns_or_moderates(current.user_id) {
        return Err(AppError::Forbidden(
            "You are not authorized to edit this post".to_string(),
        ));
    }

    // 2. Merge and validate
    let fields = PostPatch::from_form(&form).apply(&current);
    fields.validate()?;

    let (mut kept, dropped) = partition_images(&current.images, retained.as_deref());
    if kept.len() + uploads.len() > MAX_POST_IMAGES {
        return Err(AppError::BadRequest(format!(
            "A post can have at most {MAX_POST_IMAGES} images"
        )));
    }

    let added = store_images(images.as_ref(), uploads).await?;
    kept.extend(added.iter().cloned());

    // 3. Store
    let updated = sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET title = $1, content = $2, category = $3, images = $4, updated_at = NOW()
        WHERE id = $5
        RETURNING {POST_COLUMNS}
        "#
    ))
    .bind(&fields.title)
    .bind(&fields.content)
    .bind(&fields.category)
    .bind(DbJson(&kept))
    .bind(id)
    .fetch_optional(&pool)
    .await;

    let post = match updated {
        Ok(Some(post)) => post,
        Ok(None) => {
            discard_images(images.as_ref(), &image_names(&added)).await;
            return Err(AppError::NotFound("No such post".to_string()));
        }
        Err(e) => {
            discard_images(images.as_ref(), &image_names(&added)).await;
            return Err(e.into());
        }
    };

    // 4. Cleanup (best effort)
    discard_images(images.as_ref(), &image_names(&dropped)).await;

    Ok(Json(post))
}

/// Delete a post together with its comments and votes.
/// Requires: Login + (Author OR Staff).
pub async fn delete_post(
    State(pool): State<PgPool>,
    State(images): State<SharedImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, claims.user_id()?, "Your account no longer exists").await?;

    let post = sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("No such post".to_string()))?;

    if !claims.owns_or_moderates(post.user_id) {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let votes = sqlx::query("DELETE FROM votes WHERE post_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Post {} deleted with {} comments and {} votes",
        id,
        comments,
        votes
    );

    discard_images(images.as_ref(), &image_names(&post.images)).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Saves every upload; on failure the ones already written are removed.
async fn store_images(
    store: &dyn ImageStore,
    uploads: &[axum::body::Bytes],
) -> Result<Vec<Image>, AppError> {
    let mut saved = Vec::with_capacity(uploads.len());
    for bytes in uploads {
        match store.save(bytes).await {
            Ok(image) => saved.push(image),
            Err(e) => {
                discard_images(store, &image_names(&saved)).await;
                return Err(e.into());
            }
        }
    }
    Ok(saved)
}

fn image_names(images: &[Image]) -> Vec<&str> {
    images.iter().map(|i| i.name.as_str()).collect()
}
