// src/handlers/vote.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, unique_violation},
    handlers::user::require_active_user,
    models::vote::{
        CastVoteRequest, ChangeVoteRequest, Vote, VoteListParams, VoteOutcome, VoteType,
    },
    utils::jwt::Claims,
};

const VOTE_COLUMNS: &str = "id, post_id, user_id, vote_type, created_at";

/// Lists votes, optionally filtered by post and/or user.
/// Clients use it to find their own vote before deciding to cast or change.
pub async fn list_votes(
    State(pool): State<PgPool>,
    Query(params): Query<VoteListParams>,
) -> Result<impl IntoResponse, AppError> {
    let votes = sqlx::query_as::<_, Vote>(&format!(
        r#"
        SELECT {VOTE_COLUMNS}
        FROM votes
        WHERE ($1::BIGINT IS NULL OR post_id = $1)
          AND ($2::BIGINT IS NULL OR user_id = $2)
        ORDER BY id
        "#
    ))
    .bind(params.post_id)
    .bind(params.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(votes))
}

/// Cast a vote on a post.
/// Score and vote row change together or not at all.
pub async fn cast_vote(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let vote_type = VoteType::try_from(payload.vote_type)?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, user_id, "Vote author does not exist").await?;

    // 1. One vote per (user, post)
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM votes WHERE post_id = $1 AND user_id = $2",
    )
    .bind(payload.post_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Vote already exists".to_string()));
    }

    // 2. Adjust score; this also locks the post row until commit
    let new_score = adjust_score(&mut tx, payload.post_id, i32::from(vote_type.value())).await?;

    // 3. Insert Vote
    let vote = sqlx::query_as::<_, Vote>(&format!(
        r#"
        INSERT INTO votes (post_id, user_id, vote_type)
        VALUES ($1, $2, $3)
        RETURNING {VOTE_COLUMNS}
        "#
    ))
    .bind(payload.post_id)
    .bind(user_id)
    .bind(vote_type.value())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match unique_violation(&e) {
        // Concurrent request won the race
        Some(_) => AppError::Conflict("Vote already exists".to_string()),
        None => AppError::from(e),
    })?;

    tx.commit().await?;

    tracing::info!(
        "User {} voted {} on post {} (score {})",
        user_id,
        vote.vote_type,
        vote.post_id,
        new_score
    );

    Ok((
        StatusCode::CREATED,
        Json(VoteOutcome {
            new_score,
            vote: Some(vote),
        }),
    ))
}

/// Change the direction of an existing vote.
/// Requires: vote owner.
pub async fn change_vote(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ChangeVoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_type = VoteType::try_from(payload.vote_type)?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, user_id, "Your account no longer exists").await?;

    let vote = lock_own_vote(&mut tx, id, user_id).await?;
    let old_type = VoteType::try_from(vote.vote_type)?;

    let new_score = adjust_score(&mut tx, vote.post_id, old_type.delta_to(new_type)).await?;

    let vote = if old_type == new_type {
        vote
    } else {
        sqlx::query_as::<_, Vote>(&format!(
            "UPDATE votes SET vote_type = $1 WHERE id = $2 RETURNING {VOTE_COLUMNS}"
        ))
        .bind(new_type.value())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?
    };

    tx.commit().await?;

    Ok(Json(VoteOutcome {
        new_score,
        vote: Some(vote),
    }))
}

/// Retract a vote, removing its weight from the post score.
/// Requires: vote owner.
pub async fn retract_vote(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    require_active_user(&mut *tx, user_id, "Your account no longer exists").await?;

    let vote = lock_own_vote(&mut tx, id, user_id).await?;

    let new_score = adjust_score(&mut tx, vote.post_id, -i32::from(vote.vote_type)).await?;

    sqlx::query("DELETE FROM votes WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Json(VoteOutcome {
        new_score,
        vote: None,
    }))
}

/// Adds `delta` to a post's score and returns the new score.
async fn adjust_score(conn: &mut PgConnection, post_id: i64, delta: i32) -> Result<i32, AppError> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE posts SET score = score + $1 WHERE id = $2 RETURNING score",
    )
    .bind(delta)
    .bind(post_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("Post does not exist".to_string()))
}

/// Loads a vote with a row lock and checks that `user_id` cast it.
async fn lock_own_vote(conn: &mut PgConnection, id: i64, user_id: i64) -> Result<Vote, AppError> {
    let vote = sqlx::query_as::<_, Vote>(&format!(
        "SELECT {VOTE_COLUMNS} FROM votes WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("Vote does not exist".to_string()))?;

    if vote.user_id != user_id {
        return Err(AppError::Forbidden(
            "You can only modify your own vote".to_string(),
        ));
    }

    Ok(vote)
}
