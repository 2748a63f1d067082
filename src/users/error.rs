use thiserror::Error;

/// Errors surfaced by the user domain. Handlers map these onto HTTP
/// statuses; the domain itself never retries or swallows them.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("invalid value for filter `{key}`")]
    InvalidFilterValue { key: &'static str },

    #[error("unknown score field `{0}`")]
    InvalidScoreField(String),

    #[error("credential operation failed: {0}")]
    Crypto(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
