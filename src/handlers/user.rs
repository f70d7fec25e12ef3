// src/handlers/user.rs

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as DbJson};

use crate::{
    error::{AppError, unique_violation},
    models::{
        image::Image,
        user::{BanResponse, User, check_email, check_password},
    },
    utils::{
        hash::hash_password,
        html::clean_html,
        jwt::Claims,
        storage::{SharedImageStore, discard_images},
        upload::FormData,
    },
};

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, password, role, bio, avatar_name, avatar_url, is_banned, created_at";

/// Fails unless `user_id` names an existing, non-banned user.
pub(crate) async fn require_active_user<'e, E>(
    executor: E,
    user_id: i64,
    missing: &str,
) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let banned = sqlx::query_scalar::<_, bool>("SELECT is_banned FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    match banned {
        None => Err(AppError::NotFound(missing.to_string())),
        Some(true) => Err(AppError::Forbidden(
            "This account has been banned".to_string(),
        )),
        Some(false) => Ok(()),
    }
}

async fn fetch_user(pool: &PgPool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("No such user".to_string()))
}

/// Lists all users, newest first.
pub async fn list_users(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY id DESC"
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_user(&pool, id).await?))
}

/// Updates profile settings from a multipart form.
/// Requires: the user themself or an admin.
///
/// Optional fields: `email`, `password`, `bio` and a `newAvatar` file.
/// Fields that are missing or empty keep their current value.
pub async fn update_user(
    State(pool): State<PgPool>,
    State(images): State<SharedImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    if claims.user_id()? != id && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You can only edit your own profile".to_string(),
        ));
    }
    require_active_user(&pool, claims.user_id()?, "Your account no longer exists").await?;

    let form = FormData::read(multipart).await?;
    let current = fetch_user(&pool, id).await?;

    let email = form.text("email");
    if let Some(email) = email {
        check_email(email)?;
    }
    let password = match form.raw("password") {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let bio = form.text("bio").map(clean_html);

    let avatar = match form.files("newAvatar").first() {
        Some(bytes) => Some(images.save(bytes).await?),
        None => None,
    };

    if email.is_none() && password.is_none() && bio.is_none() && avatar.is_none() {
        return Ok(Json(current));
    }

    // Perform a single UPDATE with only the present fields
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(email) = email {
        separated.push("email = ");
        separated.push_bind_unseparated(email.to_string());
    }

    if let Some(password) = password {
        separated.push("password = ");
        separated.push_bind_unseparated(password);
    }

    if let Some(bio) = bio {
        separated.push("bio = ");
        separated.push_bind_unseparated(bio);
    }

    if let Some(avatar) = &avatar {
        separated.push("avatar_name = ");
        separated.push_bind_unseparated(avatar.name.clone());
        separated.push("avatar_url = ");
        separated.push_bind_unseparated(avatar.url.clone());
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {USER_COLUMNS}"));

    let updated = builder
        .build_query_as::<User>()
        .fetch_optional(&pool)
        .await;

    let user = match updated {
        Ok(Some(user)) => user,
        Ok(None) => {
            discard_new_avatar(&images, avatar.as_ref()).await;
            return Err(AppError::NotFound("No such user".to_string()));
        }
        Err(e) => {
            discard_new_avatar(&images, avatar.as_ref()).await;
            return Err(match unique_violation(&e) {
                Some(_) => AppError::Conflict("Email is already taken".to_string()),
                None => AppError::from(e),
            });
        }
    };

    if avatar.is_some() && !current.avatar_name.is_empty() {
        discard_images(images.as_ref(), &[current.avatar_name.as_str()]).await;
    }

    Ok(Json(user))
}

async fn discard_new_avatar(images: &SharedImageStore, avatar: Option<&Image>) {
    if let Some(avatar) = avatar {
        discard_images(images.as_ref(), &[avatar.name.as_str()]).await;
    }
}

/// Deletes a user and everything they authored.
/// Requires: the user themself or an admin.
///
/// The user's votes and comments on other people's posts are taken back out
/// of those posts' scores and comment counters in the same transaction.
pub async fn delete_user(
    State(pool): State<PgPool>,
    State(images): State<SharedImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if claims.user_id()? != id && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "You can only delete your own account".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, claims.user_id()?, "Your account no longer exists").await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("No such user".to_string()))?;

    // Hold the user's votes and comments so concurrent changes finish first
    sqlx::query("SELECT id FROM votes WHERE user_id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT id FROM comments WHERE user_id = $1 FOR UPDATE")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // 1. Withdraw the user's votes from post scores
    sqlx::query(
        r#"
        UPDATE posts p
        SET score = p.score - v.total
        FROM (
            SELECT post_id, SUM(vote_type)::INTEGER AS total
            FROM votes WHERE user_id = $1
            GROUP BY post_id
        ) v
        WHERE p.id = v.post_id
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // 2. Withdraw the user's comments from post counters
    sqlx::query(
        r#"
        UPDATE posts p
        SET comments_count = p.comments_count - c.total
        FROM (
            SELECT post_id, COUNT(*)::INTEGER AS total
            FROM comments WHERE user_id = $1
            GROUP BY post_id
        ) c
        WHERE p.id = c.post_id
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM votes WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM comments WHERE user_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    // 3. The user's posts, with what others attached to them
    sqlx::query("DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE user_id = $1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM votes WHERE post_id IN (SELECT id FROM posts WHERE user_id = $1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let post_images = sqlx::query_scalar::<_, DbJson<Vec<Image>>>(
        "DELETE FROM posts WHERE user_id = $1 RETURNING images",
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "User {} ({}) deleted with {} posts",
        id,
        user.username,
        post_images.len()
    );

    // 4. Cleanup (best effort)
    let mut names: Vec<&str> = post_images
        .iter()
        .flat_map(|imgs| imgs.iter().map(|i| i.name.as_str()))
        .collect();
    if !user.avatar_name.is_empty() {
        names.push(&user.avatar_name);
    }
    discard_images(images.as_ref(), &names).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Bans or unbans a user.
/// Requires: moderator or admin. Moderators cannot ban admins.
pub async fn toggle_ban(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if claims.user_id()? == id {
        return Err(AppError::BadRequest("You cannot ban yourself".to_string()));
    }
    require_active_user(&pool, claims.user_id()?, "Your account no longer exists").await?;

    let target = fetch_user(&pool, id).await?;
    if target.role == "admin" && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can ban an administrator".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET is_banned = NOT is_banned WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("No such user".to_string()))?;

    let action = if user.is_banned { "banned" } else { "unbanned" };
    tracing::info!("User {} {} by {}", user.id, action, claims.sub);

    Ok(Json(BanResponse {
        message: format!("User {action} successfully"),
        user,
    }))
}
