use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::error::UserError;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub verified: bool,
    pub birthday: Date,
    pub correct_score: i32,   // moves only through the atomic increment
    pub uncorrect_score: i32, // same
    pub followers: Vec<Uuid>, // weak references, no FK
    pub following: Vec<Uuid>,
    #[serde(skip_serializing)]
    pub email_activation_key: String, // empty once consumed
    #[serde(skip_serializing)]
    pub forgot_password_token: String, // empty unless a reset is pending
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>, // non-null = soft-deleted
}

/// Fields for inserting a user. The password is already hashed and the
/// activation key already minted by the time this reaches the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub birthday: Date,
    pub email_activation_key: String,
}

/// Partial update. `None` leaves the column untouched; `updated_at` is
/// stamped by the store on every update regardless.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<Date>,
    pub verified: Option<bool>,
    pub password_hash: Option<String>,
    pub email_activation_key: Option<String>,
    pub forgot_password_token: Option<String>,
    pub followers: Option<Vec<Uuid>>,
    pub following: Option<Vec<Uuid>>,
}

/// The two counters the estimate subsystem is allowed to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    Correct,
    Uncorrect,
}

impl ScoreField {
    /// Parses the wire-level field name; anything else is rejected rather
    /// than silently ignored.
    pub fn parse(name: &str) -> Result<Self, UserError> {
        match name {
            "correct_score" => Ok(Self::Correct),
            "uncorrect_score" => Ok(Self::Uncorrect),
            other => Err(UserError::InvalidScoreField(other.to_string())),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Correct => "correct_score",
            Self::Uncorrect => "uncorrect_score",
        }
    }
}
