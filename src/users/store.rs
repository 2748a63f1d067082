use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::UserError;
use super::filter::UserQuery;
use super::repo_types::{NewUser, ScoreField, User, UserUpdate};

/// Persistence contract for the user aggregate. Everything above this
/// trait is storage-agnostic; `increment_score` is the one operation the
/// backing store must implement as a true atomic update.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, UserError>;
    async fn get_by_id(&self, id: Uuid) -> Result<User, UserError>;
    async fn get_by_email(&self, email: &str) -> Result<User, UserError>;
    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, UserError>;
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError>;
    async fn increment_score(&self, id: Uuid, field: ScoreField) -> Result<(), UserError>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), UserError>;
}

/// Map-backed store for tests and the fake app state. Increments run
/// under the same lock as every other mutation, so the no-lost-updates
/// property holds here just as it does for the SQL store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply(user: &mut User, update: UserUpdate) {
    if let Some(v) = update.first_name {
        user.first_name = v;
    }
    if let Some(v) = update.last_name {
        user.last_name = v;
    }
    if let Some(v) = update.email {
        user.email = v;
    }
    if let Some(v) = update.birthday {
        user.birthday = v;
    }
    if let Some(v) = update.verified {
        user.verified = v;
    }
    if let Some(v) = update.password_hash {
        user.password_hash = v;
    }
    if let Some(v) = update.email_activation_key {
        user.email_activation_key = v;
    }
    if let Some(v) = update.forgot_password_token {
        user.forgot_password_token = v;
    }
    if let Some(v) = update.followers {
        user.followers = v;
    }
    if let Some(v) = update.following {
        user.following = v;
    }
    user.updated_at = OffsetDateTime::now_utc();
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, UserError> {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            password_hash: new.password_hash,
            verified: false,
            birthday: new.birthday,
            correct_score: 0,
            uncorrect_score: 0,
            followers: Vec::new(),
            following: Vec::new(),
            email_activation_key: new.email_activation_key,
            forgot_password_token: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock().insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, UserError> {
        self.lock().get(&id).cloned().ok_or(UserError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.lock()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(UserError::NotFound)
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>, UserError> {
        let mut users: Vec<User> = self
            .lock()
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users.truncate(query.limit.max(0) as usize);
        Ok(users)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        let mut users = self.lock();
        let user = users.get_mut(&id).ok_or(UserError::NotFound)?;
        apply(user, update);
        Ok(user.clone())
    }

    async fn increment_score(&self, id: Uuid, field: ScoreField) -> Result<(), UserError> {
        let mut users = self.lock();
        let user = users.get_mut(&id).ok_or(UserError::NotFound)?;
        match field {
            ScoreField::Correct => user.correct_score += 1,
            ScoreField::Uncorrect => user.uncorrect_score += 1,
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), UserError> {
        let mut users = self.lock();
        let user = users.get_mut(&id).ok_or(UserError::NotFound)?;
        if user.deleted_at.is_some() {
            return Err(UserError::NotFound);
        }
        user.deleted_at = Some(OffsetDateTime::now_utc());
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use time::macros::date;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Test".into(),
            last_name: "User".into(),
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            birthday: date!(1992 - 03 - 01),
            email_activation_key: "activation".into(),
        }
    }

    #[tokio::test]
    async fn create_then_lookup_by_id_and_email() {
        let store = MemoryUserStore::default();
        let created = store.create(new_user("a@example.com")).await.expect("create");
        assert_eq!(created.correct_score, 0);
        assert!(!created.verified);

        let by_id = store.get_by_id(created.id).await.expect("get_by_id");
        assert_eq!(by_id.email, "a@example.com");
        let by_email = store.get_by_email("a@example.com").await.expect("get_by_email");
        assert_eq!(by_email.id, created.id);

        assert!(matches!(
            store.get_by_id(Uuid::new_v4()).await.unwrap_err(),
            UserError::NotFound
        ));
    }

    #[tokio::test]
    async fn update_applies_partial_fields_and_stamps_updated_at() {
        let store = MemoryUserStore::default();
        let created = store.create(new_user("b@example.com")).await.expect("create");

        let updated = store
            .update(
                created.id,
                UserUpdate {
                    first_name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.first_name, "Renamed");
        assert_eq!(updated.last_name, "User");
        assert!(updated.updated_at >= created.updated_at);

        assert!(matches!(
            store
                .update(Uuid::new_v4(), UserUpdate::default())
                .await
                .unwrap_err(),
            UserError::NotFound
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_never_lost() {
        let store = Arc::new(MemoryUserStore::default());
        let user = store.create(new_user("c@example.com")).await.expect("create");

        let mut handles = Vec::new();
        for i in 0..100 {
            let store = store.clone();
            let id = user.id;
            let field = if i % 2 == 0 {
                ScoreField::Correct
            } else {
                ScoreField::Uncorrect
            };
            handles.push(tokio::spawn(async move {
                store.increment_score(id, field).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("increment");
        }

        let user = store.get_by_id(user.id).await.expect("get");
        assert_eq!(user.correct_score, 50);
        assert_eq!(user.uncorrect_score, 50);
    }

    #[tokio::test]
    async fn soft_deleted_users_hidden_from_list_but_addressable() {
        let store = MemoryUserStore::default();
        let kept = store.create(new_user("kept@example.com")).await.expect("create");
        let gone = store.create(new_user("gone@example.com")).await.expect("create");

        store.soft_delete(gone.id).await.expect("soft delete");

        let query = UserQuery::compile(&HashMap::new()).expect("compile");
        let listed = store.list(&query).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);

        let fetched = store.get_by_id(gone.id).await.expect("still addressable");
        assert!(fetched.deleted_at.is_some());

        // second delete finds nothing alive
        assert!(matches!(
            store.soft_delete(gone.id).await.unwrap_err(),
            UserError::NotFound
        ));
    }

    #[tokio::test]
    async fn list_honors_limit_newest_first() {
        let store = MemoryUserStore::default();
        for i in 0..5 {
            store
                .create(new_user(&format!("u{i}@example.com")))
                .await
                .expect("create");
        }
        let query = UserQuery {
            limit: 3,
            ..Default::default()
        };
        let listed = store.list(&query).await.expect("list");
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
