use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            ResetPasswordRequest,
        },
        jwt::JwtKeys,
    },
    state::AppState,
    users::{error::UserError, handlers::error_response, services::RegisterUser},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/password/forgot", post(forgot_password))
        .route("/auth/password/reset", post(reset_password))
}

fn sign_pair(
    state: &AppState,
    user_id: uuid::Uuid,
) -> Result<(String, String), (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user_id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(user_id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok((access_token, refresh_token))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        warn!("empty name in registration");
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    // Ensure email is not taken; the unique constraint is the backstop
    if let Ok(existing) = state.users.get_by_email(&payload.email).await {
        warn!(email = %existing.email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let user = state
        .users
        .register(RegisterUser {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password: payload.password,
            birthday: payload.birthday,
        })
        .await
        .map_err(error_response)?;

    let (access_token, refresh_token) = sign_pair(&state, user.id)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match state.users.get_by_email(&payload.email).await {
        Ok(u) => u,
        Err(UserError::NotFound) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(error_response(e)),
    };

    if user.deleted_at.is_some() {
        warn!(user_id = %user.id, "login on soft-deleted account");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let ok = state
        .users
        .compare_password(&payload.password, &user.password_hash)
        .map_err(error_response)?;
    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let (access_token, refresh_token) = sign_pair(&state, user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("{}", e)))?;

    let user = state
        .users
        .get(claims.sub)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let (access_token, refresh_token) = sign_pair(&state, user.id)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    // The token only leaves the process through the mailer.
    let _token = state
        .users
        .forgot_password(&payload.email)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.password.len() < 8 {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match state
        .users
        .reset_password(&payload.email, &payload.token, &payload.password)
        .await
    {
        Ok(user) => {
            info!(user_id = %user.id, "password reset completed");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(UserError::NotFound) => {
            warn!(email = %payload.email, "reset with wrong email or token");
            Err((StatusCode::BAD_REQUEST, "Invalid email or reset token".into()))
        }
        Err(e) => Err(error_response(e)),
    }
}
