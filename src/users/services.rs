use std::collections::HashMap;
use std::sync::Arc;

use time::Date;
use tracing::info;
use uuid::Uuid;

use super::credentials::CredentialEngine;
use super::error::UserError;
use super::filter::UserQuery;
use super::repo_types::{NewUser, ScoreField, User, UserUpdate};
use super::store::UserStore;

/// Registration input as it arrives from the outside, plaintext password
/// included. It never reaches the store in this form.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub birthday: Date,
}

/// Operational glue over the store and the credential engine. The HTTP
/// layer and the estimate-resolution subsystem both come through here.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    credentials: CredentialEngine,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, credentials: CredentialEngine) -> Self {
        Self { store, credentials }
    }

    /// Hashes the password and mints the activation key, then persists.
    /// A crypto failure aborts before anything is written.
    pub async fn register(&self, new: RegisterUser) -> Result<User, UserError> {
        let password_hash = self.credentials.hash(&new.password)?;
        let email_activation_key = self.credentials.generate_token()?;
        let user = self
            .store
            .create(NewUser {
                first_name: new.first_name,
                last_name: new.last_name,
                email: new.email,
                password_hash,
                birthday: new.birthday,
                email_activation_key,
            })
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, UserError> {
        self.store.get_by_id(id).await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.store.get_by_email(email).await
    }

    /// Compiles raw listing criteria and runs the bounded query.
    pub async fn list(&self, params: &HashMap<String, String>) -> Result<Vec<User>, UserError> {
        let query = UserQuery::compile(params)?;
        self.store.list(&query).await
    }

    /// Last-writer-wins; there is no version check on profile updates.
    pub async fn update_profile(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        self.store.update(id, update).await
    }

    pub fn compare_password(&self, plain: &str, hash: &str) -> Result<bool, UserError> {
        self.credentials.verify(plain, hash)
    }

    /// Hashes the new password and clears any pending reset token in the
    /// same update, making the token single-use.
    pub async fn change_password(&self, id: Uuid, new_password: &str) -> Result<User, UserError> {
        let password_hash = self.credentials.hash(new_password)?;
        self.store
            .update(
                id,
                UserUpdate {
                    password_hash: Some(password_hash),
                    forgot_password_token: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
    }

    /// Mints and persists a reset token. Delivering it to the user is the
    /// mailer's job; the token is returned for that collaborator only.
    pub async fn forgot_password(&self, email: &str) -> Result<String, UserError> {
        let user = self.store.get_by_email(email).await?;
        let token = self.credentials.generate_token()?;
        self.store
            .update(
                user.id,
                UserUpdate {
                    forgot_password_token: Some(token.clone()),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user.id, "password reset token issued");
        Ok(token)
    }

    /// The pair (email, pending token) addresses the user; no match is
    /// `NotFound`, the same as a lookup miss.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<User, UserError> {
        let user = self.store.get_by_email(email).await?;
        if user.forgot_password_token.is_empty() || user.forgot_password_token != token {
            return Err(UserError::NotFound);
        }
        self.change_password(user.id, new_password).await
    }

    /// Entry point for the estimate-resolution subsystem. The field name is
    /// validated here; the store only ever sees the closed enum.
    pub async fn increment_score(&self, id: Uuid, field: &str) -> Result<(), UserError> {
        let field = ScoreField::parse(field)?;
        self.store.increment_score(id, field).await
    }

    /// Two independent single-row updates; relations are weak references
    /// and there is no cross-user transaction.
    pub async fn follow(&self, follower_id: Uuid, target_id: Uuid) -> Result<(), UserError> {
        let follower = self.store.get_by_id(follower_id).await?;
        let target = self.store.get_by_id(target_id).await?;

        if !follower.following.contains(&target_id) {
            let mut following = follower.following;
            following.push(target_id);
            self.store
                .update(
                    follower_id,
                    UserUpdate {
                        following: Some(following),
                        ..Default::default()
                    },
                )
                .await?;
        }
        if !target.followers.contains(&follower_id) {
            let mut followers = target.followers;
            followers.push(follower_id);
            self.store
                .update(
                    target_id,
                    UserUpdate {
                        followers: Some(followers),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: Uuid, target_id: Uuid) -> Result<(), UserError> {
        let follower = self.store.get_by_id(follower_id).await?;
        let target = self.store.get_by_id(target_id).await?;

        if follower.following.contains(&target_id) {
            let following: Vec<Uuid> = follower
                .following
                .into_iter()
                .filter(|id| *id != target_id)
                .collect();
            self.store
                .update(
                    follower_id,
                    UserUpdate {
                        following: Some(following),
                        ..Default::default()
                    },
                )
                .await?;
        }
        if target.followers.contains(&follower_id) {
            let followers: Vec<Uuid> = target
                .followers
                .into_iter()
                .filter(|id| *id != follower_id)
                .collect();
            self.store
                .update(
                    target_id,
                    UserUpdate {
                        followers: Some(followers),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<(), UserError> {
        self.store.soft_delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::config::CryptoConfig;
    use crate::users::store::MemoryUserStore;

    use super::*;

    fn service() -> UserService {
        let credentials = CredentialEngine::new(&CryptoConfig {
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            token_bytes: 20,
        })
        .expect("engine should build");
        UserService::new(Arc::new(MemoryUserStore::default()), credentials)
    }

    fn registration(email: &str) -> RegisterUser {
        RegisterUser {
            first_name: "Mert".into(),
            last_name: "Demir".into(),
            email: email.into(),
            password: "secret-password".into(),
            birthday: date!(1994 - 11 - 02),
        }
    }

    #[tokio::test]
    async fn register_never_persists_the_plaintext() {
        let svc = service();
        let user = svc.register(registration("a@example.com")).await.expect("register");

        assert_ne!(user.password_hash, "secret-password");
        assert!(!user.password_hash.contains("secret-password"));
        assert!(!user.email_activation_key.is_empty());
        assert!(svc
            .compare_password("secret-password", &user.password_hash)
            .expect("verify"));
    }

    #[tokio::test]
    async fn change_password_clears_reset_token_and_invalidates_old() {
        let svc = service();
        let user = svc.register(registration("b@example.com")).await.expect("register");

        let token = svc.forgot_password("b@example.com").await.expect("forgot");
        let pending = svc.get(user.id).await.expect("get");
        assert_eq!(pending.forgot_password_token, token);

        let changed = svc
            .change_password(user.id, "brand-new-password")
            .await
            .expect("change");
        assert_eq!(changed.forgot_password_token, "");
        assert!(svc
            .compare_password("brand-new-password", &changed.password_hash)
            .expect("verify new"));
        assert!(!svc
            .compare_password("secret-password", &changed.password_hash)
            .expect("verify old"));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let svc = service();
        svc.register(registration("c@example.com")).await.expect("register");

        let token = svc.forgot_password("c@example.com").await.expect("forgot");
        svc.reset_password("c@example.com", &token, "after-reset")
            .await
            .expect("first reset");

        let err = svc
            .reset_password("c@example.com", &token, "after-reset-again")
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::NotFound));
    }

    #[tokio::test]
    async fn reset_rejects_wrong_token() {
        let svc = service();
        svc.register(registration("d@example.com")).await.expect("register");
        svc.forgot_password("d@example.com").await.expect("forgot");

        let err = svc
            .reset_password("d@example.com", "guessed-token", "pwned")
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::NotFound));
    }

    #[tokio::test]
    async fn increment_score_validates_the_field_name() {
        let svc = service();
        let user = svc.register(registration("e@example.com")).await.expect("register");

        svc.increment_score(user.id, "correct_score").await.expect("correct");
        svc.increment_score(user.id, "uncorrect_score").await.expect("uncorrect");
        svc.increment_score(user.id, "correct_score").await.expect("correct again");

        let user = svc.get(user.id).await.expect("get");
        assert_eq!(user.correct_score, 2);
        assert_eq!(user.uncorrect_score, 1);

        let err = svc.increment_score(user.id, "karma").await.unwrap_err();
        assert!(matches!(err, UserError::InvalidScoreField(_)));
    }

    #[tokio::test]
    async fn follow_links_both_sides_and_unfollow_undoes_it() {
        let svc = service();
        let alice = svc.register(registration("alice@example.com")).await.expect("register");
        let bob = svc.register(registration("bob@example.com")).await.expect("register");

        svc.follow(alice.id, bob.id).await.expect("follow");
        // idempotent
        svc.follow(alice.id, bob.id).await.expect("follow again");

        let alice_now = svc.get(alice.id).await.expect("get alice");
        let bob_now = svc.get(bob.id).await.expect("get bob");
        assert_eq!(alice_now.following, vec![bob.id]);
        assert_eq!(bob_now.followers, vec![alice.id]);

        svc.unfollow(alice.id, bob.id).await.expect("unfollow");
        let alice_now = svc.get(alice.id).await.expect("get alice");
        let bob_now = svc.get(bob.id).await.expect("get bob");
        assert!(alice_now.following.is_empty());
        assert!(bob_now.followers.is_empty());
    }

    #[tokio::test]
    async fn listing_criteria_flow_through_the_compiler() {
        let svc = service();
        svc.register(registration("anna@example.com")).await.expect("register");

        let mut params = HashMap::new();
        params.insert("first_name".to_string(), "Me".to_string());
        let found = svc.list(&params).await.expect("list");
        assert_eq!(found.len(), 1);

        params.insert("limit".to_string(), "zero".to_string());
        let err = svc.list(&params).await.unwrap_err();
        assert!(matches!(
            err,
            UserError::InvalidFilterValue { key: "limit" }
        ));
    }
}
