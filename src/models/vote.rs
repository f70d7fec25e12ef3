use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Represents the 'votes' table in the database.
/// At most one row exists per (user, post) pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub vote_type: i16,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Direction of a vote. "No vote" is the absence of a row, never a zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn value(self) -> i16 {
        match self {
            VoteType::Up => 1,
            VoteType::Down => -1,
        }
    }

    /// Score adjustment when a vote moves from `self` to `new`.
    pub fn delta_to(self, new: VoteType) -> i32 {
        i32::from(new.value()) - i32::from(self.value())
    }
}

impl TryFrom<i16> for VoteType {
    type Error = AppError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteType::Up),
            -1 => Ok(VoteType::Down),
            other => Err(AppError::BadRequest(format!(
                "Vote type must be 1 or -1, got {other}"
            ))),
        }
    }
}

/// DTO for casting a vote.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub post_id: i64,
    #[serde(rename = "type")]
    pub vote_type: i16,
}

/// DTO for changing the direction of an existing vote.
#[derive(Debug, Deserialize)]
pub struct ChangeVoteRequest {
    #[serde(rename = "type")]
    pub vote_type: i16,
}

/// Query parameters for looking up votes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteListParams {
    pub post_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// Result of every vote mutation: the post's score after the change.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub new_score: i32,
    pub vote: Option<Vote>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plus_and_minus_one_are_votes() {
        assert_eq!(VoteType::try_from(1).unwrap(), VoteType::Up);
        assert_eq!(VoteType::try_from(-1).unwrap(), VoteType::Down);
        assert!(VoteType::try_from(0).is_err());
        assert!(VoteType::try_from(2).is_err());
    }

    #[test]
    fn deltas_keep_score_equal_to_the_vote_sum() {
        // cast up, flip to down, flip back, retract
        let mut score = 0i32;
        score += i32::from(VoteType::Up.value());
        assert_eq!(score, 1);
        score += VoteType::Up.delta_to(VoteType::Down);
        assert_eq!(score, -1);
        score += VoteType::Down.delta_to(VoteType::Down);
        assert_eq!(score, -1);
        score += VoteType::Down.delta_to(VoteType::Up);
        assert_eq!(score, 1);
        score -= i32::from(VoteType::Up.value());
        assert_eq!(score, 0);
    }

    #[test]
    fn serializes_direction_as_type() {
        let vote = Vote {
            id: 3,
            post_id: 9,
            user_id: 4,
            vote_type: -1,
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["type"], -1);
        assert_eq!(json["postId"], 9);
    }
}
