use crate::state::AppState;
use axum::Router;

pub mod cookie;
pub mod dto;
pub mod gate;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod services;

pub use gate::{AuthGate, CurrentUser};
pub use jwt::TokenService;
pub use password::CredentialHasher;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes(state))
}
