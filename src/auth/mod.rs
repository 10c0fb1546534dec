pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod repo;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
        .merge(oauth::routes())
}
