use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{auth::handlers::is_valid_email, auth::jwt::AuthUser, state::AppState};

use super::dto::{ChangePasswordRequest, PublicUser, UpdateProfileRequest};
use super::error::UserError;
use super::repo_types::UserUpdate;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
        .route("/users/:id/follow", axum::routing::post(follow_user).delete(unfollow_user))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/me/password", put(change_my_password))
}

/// Maps domain errors onto HTTP statuses; internals are logged, not leaked.
pub(crate) fn error_response(e: UserError) -> (StatusCode, String) {
    match &e {
        UserError::NotFound => (StatusCode::NOT_FOUND, "user not found".into()),
        UserError::InvalidFilterValue { .. } | UserError::InvalidScoreField(_) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        UserError::Crypto(_) | UserError::Db(_) => {
            error!(error = %e, "user operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let users = state.users.list(&params).await.map_err(error_response)?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state.users.get(id).await.map_err(error_response)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state.users.get(user_id).await.map_err(error_response)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                warn!(user_id = %user_id, "invalid email in profile update");
                return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let update = UserUpdate {
        first_name: payload.first_name,
        last_name: payload.last_name,
        email,
        birthday: payload.birthday,
        ..Default::default()
    };
    let user = state
        .users
        .update_profile(user_id, update)
        .await
        .map_err(error_response)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_my_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if payload.new_password.len() < 8 {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let user = state.users.get(user_id).await.map_err(error_response)?;
    let ok = state
        .users
        .compare_password(&payload.current_password, &user.password_hash)
        .map_err(error_response)?;
    if !ok {
        warn!(user_id = %user_id, "wrong current password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    state
        .users
        .change_password(user_id, &payload.new_password)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, (StatusCode, String)> {
    state.users.soft_delete(user_id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn follow_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(target_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if user_id == target_id {
        return Err((StatusCode::BAD_REQUEST, "cannot follow yourself".into()));
    }
    state
        .users
        .follow(user_id, target_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn unfollow_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(target_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .users
        .unfollow(user_id, target_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
