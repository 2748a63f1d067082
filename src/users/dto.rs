use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::User;

/// Public part of a user returned to clients. Credentials and pending
/// secrets never appear here.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub verified: bool,
    pub birthday: Date,
    pub correct_score: i32,
    pub uncorrect_score: i32,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            verified: user.verified,
            birthday: user.birthday,
            correct_score: user.correct_score,
            uncorrect_score: user.uncorrect_score,
            followers: user.followers,
            following: user.following,
            created_at: user.created_at,
        }
    }
}

/// Body for PATCH /me. Absent fields stay untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<Date>,
}

/// Body for PUT /me/password.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn public_user_hides_credentials() {
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Anna".into(),
            last_name: "Kowalski".into(),
            email: "anna@example.com".into(),
            password_hash: "$argon2id$super-secret".into(),
            verified: true,
            birthday: date!(1990 - 06 - 15),
            correct_score: 3,
            uncorrect_score: 1,
            followers: vec![],
            following: vec![],
            email_activation_key: "activation-key".into(),
            forgot_password_token: "reset-token".into(),
            created_at: datetime!(2024-01-10 12:00 UTC),
            updated_at: datetime!(2024-01-10 12:00 UTC),
            deleted_at: None,
        };

        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("anna@example.com"));
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("activation-key"));
        assert!(!json.contains("reset-token"));
    }
}
