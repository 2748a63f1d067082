use std::collections::HashMap;

use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use super::error::UserError;
use super::repo_types::User;

pub const DEFAULT_LIMIT: i64 = 25;

/// One typed predicate compiled from a raw filter criterion. The set is
/// closed: every recognized key maps onto exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum UserFilter {
    FirstNameContains(String),
    LastNameContains(String),
    EmailContains(String),
    BirthdayAfter(Date),
    BirthdayBefore(Date),
    CorrectScoreAbove(i32),
    CorrectScoreBelow(i32),
    UncorrectScoreAbove(i32),
    UncorrectScoreBelow(i32),
    CreatedAfter(OffsetDateTime),
    CreatedBefore(OffsetDateTime),
    UpdatedAfter(OffsetDateTime),
    UpdatedBefore(OffsetDateTime),
    FriendsAny(Vec<Uuid>),
}

/// Store-agnostic query descriptor: the Postgres store renders it to SQL,
/// the in-memory store evaluates it with [`UserQuery::matches`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserQuery {
    pub filters: Vec<UserFilter>,
    pub limit: i64,
    /// Nothing on the filter surface maps onto this; listings always
    /// exclude soft-deleted users.
    pub include_deleted: bool,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            limit: DEFAULT_LIMIT,
            include_deleted: false,
        }
    }
}

impl UserQuery {
    /// Compiles raw query parameters into a descriptor. Unrecognized keys
    /// are ignored; empty values are treated as absent; a value that does
    /// not parse fails naming the offending key. Range bounds are strict
    /// on both ends and compose with AND.
    pub fn compile(params: &HashMap<String, String>) -> Result<Self, UserError> {
        let mut filters = Vec::new();

        if let Some(s) = text_param(params, "first_name") {
            filters.push(UserFilter::FirstNameContains(s.to_string()));
        }
        if let Some(s) = text_param(params, "last_name") {
            filters.push(UserFilter::LastNameContains(s.to_string()));
        }
        if let Some(s) = text_param(params, "email") {
            filters.push(UserFilter::EmailContains(s.to_string()));
        }

        if let Some(d) = date_param(params, "start_birthday_at")? {
            filters.push(UserFilter::BirthdayAfter(d));
        }
        if let Some(d) = date_param(params, "end_birthday_at")? {
            filters.push(UserFilter::BirthdayBefore(d));
        }

        if let Some(n) = int_param(params, "start_correct_score_at")? {
            filters.push(UserFilter::CorrectScoreAbove(n));
        }
        if let Some(n) = int_param(params, "end_correct_score_at")? {
            filters.push(UserFilter::CorrectScoreBelow(n));
        }
        if let Some(n) = int_param(params, "start_uncorrect_score_at")? {
            filters.push(UserFilter::UncorrectScoreAbove(n));
        }
        if let Some(n) = int_param(params, "end_uncorrect_score_at")? {
            filters.push(UserFilter::UncorrectScoreBelow(n));
        }

        if let Some(t) = timestamp_param(params, "start_created_at")? {
            filters.push(UserFilter::CreatedAfter(t));
        }
        if let Some(t) = timestamp_param(params, "end_created_at")? {
            filters.push(UserFilter::CreatedBefore(t));
        }
        if let Some(t) = timestamp_param(params, "start_updated_at")? {
            filters.push(UserFilter::UpdatedAfter(t));
        }
        if let Some(t) = timestamp_param(params, "end_updated_at")? {
            filters.push(UserFilter::UpdatedBefore(t));
        }

        if let Some(ids) = friends_param(params)? {
            filters.push(UserFilter::FriendsAny(ids));
        }

        let limit = match text_param(params, "limit") {
            None => DEFAULT_LIMIT,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(UserError::InvalidFilterValue { key: "limit" })?,
        };

        Ok(Self {
            filters,
            limit,
            include_deleted: false,
        })
    }

    /// In-memory evaluation of the descriptor against one user. Keeps the
    /// same semantics the SQL rendering has, soft-delete exclusion included.
    pub fn matches(&self, user: &User) -> bool {
        if !self.include_deleted && user.deleted_at.is_some() {
            return false;
        }
        self.filters.iter().all(|f| match f {
            UserFilter::FirstNameContains(s) => user.first_name.contains(s.as_str()),
            UserFilter::LastNameContains(s) => user.last_name.contains(s.as_str()),
            UserFilter::EmailContains(s) => user.email.contains(s.as_str()),
            UserFilter::BirthdayAfter(d) => user.birthday > *d,
            UserFilter::BirthdayBefore(d) => user.birthday < *d,
            UserFilter::CorrectScoreAbove(n) => user.correct_score > *n,
            UserFilter::CorrectScoreBelow(n) => user.correct_score < *n,
            UserFilter::UncorrectScoreAbove(n) => user.uncorrect_score > *n,
            UserFilter::UncorrectScoreBelow(n) => user.uncorrect_score < *n,
            UserFilter::CreatedAfter(t) => user.created_at > *t,
            UserFilter::CreatedBefore(t) => user.created_at < *t,
            UserFilter::UpdatedAfter(t) => user.updated_at > *t,
            UserFilter::UpdatedBefore(t) => user.updated_at < *t,
            UserFilter::FriendsAny(ids) => ids.iter().any(|id| user.following.contains(id)),
        })
    }
}

fn text_param<'a>(params: &'a HashMap<String, String>, key: &'static str) -> Option<&'a str> {
    params.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
}

fn int_param(
    params: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<i32>, UserError> {
    match text_param(params, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i32>()
            .map(Some)
            .map_err(|_| UserError::InvalidFilterValue { key }),
    }
}

fn date_param(
    params: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<Date>, UserError> {
    match text_param(params, key) {
        None => Ok(None),
        Some(raw) => Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map(Some)
            .map_err(|_| UserError::InvalidFilterValue { key }),
    }
}

fn timestamp_param(
    params: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<OffsetDateTime>, UserError> {
    match text_param(params, key) {
        None => Ok(None),
        Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
            .map(Some)
            .map_err(|_| UserError::InvalidFilterValue { key }),
    }
}

fn friends_param(params: &HashMap<String, String>) -> Result<Option<Vec<Uuid>>, UserError> {
    match text_param(params, "friends") {
        None => Ok(None),
        Some(raw) => raw
            .split(',')
            .map(|part| Uuid::parse_str(part.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|_| UserError::InvalidFilterValue { key: "friends" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            first_name: "Anna".into(),
            last_name: "Kowalski".into(),
            email: "anna@example.com".into(),
            password_hash: "$argon2id$fake".into(),
            verified: true,
            birthday: date!(1990 - 06 - 15),
            correct_score: 7,
            uncorrect_score: 2,
            followers: vec![],
            following: vec![],
            email_activation_key: String::new(),
            forgot_password_token: String::new(),
            created_at: datetime!(2024-01-10 12:00 UTC),
            updated_at: datetime!(2024-01-10 12:00 UTC),
            deleted_at: None,
        }
    }

    #[test]
    fn empty_params_compile_to_defaults() {
        let q = UserQuery::compile(&params(&[])).expect("compile");
        assert!(q.filters.is_empty());
        assert_eq!(q.limit, DEFAULT_LIMIT);
        assert!(!q.include_deleted);
    }

    #[test]
    fn substring_and_limit_compile() {
        let q = UserQuery::compile(&params(&[("first_name", "An"), ("limit", "10")]))
            .expect("compile");
        assert_eq!(q.limit, 10);
        assert_eq!(q.filters, vec![UserFilter::FirstNameContains("An".into())]);
        assert!(q.matches(&sample_user()));
    }

    #[test]
    fn unrecognized_keys_are_ignored() {
        let q = UserQuery::compile(&params(&[("sort_by", "elo"), ("page", "3")]))
            .expect("compile");
        assert!(q.filters.is_empty());
    }

    #[test]
    fn malformed_values_name_the_key() {
        let cases: &[(&str, &str)] = &[
            ("limit", "ten"),
            ("limit", "0"),
            ("limit", "-5"),
            ("start_correct_score_at", "high"),
            ("start_birthday_at", "15/06/1990"),
            ("start_created_at", "yesterday"),
            ("friends", "not-a-uuid"),
        ];
        for (key, value) in cases {
            let err = UserQuery::compile(&params(&[(key, value)])).unwrap_err();
            match err {
                UserError::InvalidFilterValue { key: k } => assert_eq!(&k, key),
                other => panic!("expected InvalidFilterValue for {key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn score_range_bounds_are_strict() {
        let q = UserQuery::compile(&params(&[
            ("start_correct_score_at", "5"),
            ("end_correct_score_at", "10"),
        ]))
        .expect("compile");

        let mut user = sample_user();
        user.correct_score = 7;
        assert!(q.matches(&user));
        user.correct_score = 5;
        assert!(!q.matches(&user));
        user.correct_score = 10;
        assert!(!q.matches(&user));
    }

    #[test]
    fn birthday_range_bounds_are_strict() {
        let q = UserQuery::compile(&params(&[
            ("start_birthday_at", "1990-01-01"),
            ("end_birthday_at", "1991-01-01"),
        ]))
        .expect("compile");

        let mut user = sample_user();
        assert!(q.matches(&user));
        user.birthday = date!(1990 - 01 - 01);
        assert!(!q.matches(&user));
        user.birthday = date!(1991 - 01 - 01);
        assert!(!q.matches(&user));
    }

    #[test]
    fn contains_is_case_sensitive() {
        // "Anna" has no lowercase "an" substring
        let q = UserQuery::compile(&params(&[("first_name", "an")])).expect("compile");
        assert!(!q.matches(&sample_user()));

        let q = UserQuery::compile(&params(&[("first_name", "nn")])).expect("compile");
        assert!(q.matches(&sample_user()));
    }

    #[test]
    fn friends_filter_matches_overlap_with_following() {
        let friend = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let q = UserQuery::compile(&params(&[(
            "friends",
            &format!("{friend},{stranger}"),
        )]))
        .expect("compile");

        let mut user = sample_user();
        assert!(!q.matches(&user));
        user.following.push(friend);
        assert!(q.matches(&user));
    }

    #[test]
    fn soft_deleted_users_never_match() {
        let q = UserQuery::compile(&params(&[])).expect("compile");
        let mut user = sample_user();
        assert!(q.matches(&user));
        user.deleted_at = Some(datetime!(2024-02-01 00:00 UTC));
        assert!(!q.matches(&user));
    }
}
