use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::error::UserError;
use super::filter::{UserFilter, UserQuery};
use super::repo_types::{NewUser, ScoreField, User, UserUpdate};
use super::store::UserStore;

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, verified, birthday, \
     correct_score, uncorrect_score, followers, following, email_activation_key, \
     forgot_password_token, created_at, updated_at, deleted_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// LIKE wildcards in user input must match literally
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_contains(qb: &mut QueryBuilder<'_, Postgres>, column: &str, needle: &str) {
    qb.push(" AND ");
    qb.push(column);
    qb.push(" LIKE ");
    qb.push_bind(format!("%{}%", escape_like(needle)));
    qb.push(" ESCAPE '\\'");
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, UserError> {
        let sql = format!(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, birthday, email_activation_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.birthday)
            .bind(&new.email_activation_key)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, UserError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?
            .ok_or(UserError::NotFound)
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, UserError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1"));

        if !query.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }

        for filter in &query.filters {
            match filter {
                UserFilter::FirstNameContains(s) => push_contains(&mut qb, "first_name", s),
                UserFilter::LastNameContains(s) => push_contains(&mut qb, "last_name", s),
                UserFilter::EmailContains(s) => push_contains(&mut qb, "email", s),
                UserFilter::BirthdayAfter(d) => {
                    qb.push(" AND birthday > ");
                    qb.push_bind(*d);
                }
                UserFilter::BirthdayBefore(d) => {
                    qb.push(" AND birthday < ");
                    qb.push_bind(*d);
                }
                UserFilter::CorrectScoreAbove(n) => {
                    qb.push(" AND correct_score > ");
                    qb.push_bind(*n);
                }
                UserFilter::CorrectScoreBelow(n) => {
                    qb.push(" AND correct_score < ");
                    qb.push_bind(*n);
                }
                UserFilter::UncorrectScoreAbove(n) => {
                    qb.push(" AND uncorrect_score > ");
                    qb.push_bind(*n);
                }
                UserFilter::UncorrectScoreBelow(n) => {
                    qb.push(" AND uncorrect_score < ");
                    qb.push_bind(*n);
                }
                UserFilter::CreatedAfter(t) => {
                    qb.push(" AND created_at > ");
                    qb.push_bind(*t);
                }
                UserFilter::CreatedBefore(t) => {
                    qb.push(" AND created_at < ");
                    qb.push_bind(*t);
                }
                UserFilter::UpdatedAfter(t) => {
                    qb.push(" AND updated_at > ");
                    qb.push_bind(*t);
                }
                UserFilter::UpdatedBefore(t) => {
                    qb.push(" AND updated_at < ");
                    qb.push_bind(*t);
                }
                UserFilter::FriendsAny(ids) => {
                    qb.push(" AND following && ");
                    qb.push_bind(ids.clone());
                }
            }
        }

        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(query.limit);

        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = now()");

        if let Some(v) = update.first_name {
            qb.push(", first_name = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.last_name {
            qb.push(", last_name = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.email {
            qb.push(", email = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.birthday {
            qb.push(", birthday = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.verified {
            qb.push(", verified = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.password_hash {
            qb.push(", password_hash = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.email_activation_key {
            qb.push(", email_activation_key = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.forgot_password_token {
            qb.push(", forgot_password_token = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.followers {
            qb.push(", followers = ");
            qb.push_bind(v);
        }
        if let Some(v) = update.following {
            qb.push(", following = ");
            qb.push_bind(v);
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        qb.build_query_as::<User>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(UserError::NotFound)
    }

    /// The whole point of this operation: one `SET col = col + 1` statement,
    /// so concurrent estimate resolutions cannot lose increments.
    async fn increment_score(&self, id: Uuid, field: ScoreField) -> Result<(), UserError> {
        let col = field.column();
        let sql = format!("UPDATE users SET {col} = {col} + 1, updated_at = now() WHERE id = $1");
        let result = sqlx::query(&sql).bind(id).execute(&self.db).await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), UserError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }
}
