use crate::state::AppState;
use axum::Router;

pub mod credentials;
pub mod dto;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod store;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::me_routes())
}
