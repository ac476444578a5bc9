use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::{
    auth::dto::{LoginRequest, RegisterRequest},
    errors::{AppError, AppResult},
    state::AppState,
    users::{normalize_email, StoreError, User},
};

/// Validates, hashes and stores a new account.
pub async fn register_user(state: &AppState, mut payload: RegisterRequest) -> AppResult<User> {
    if let Err(msg) = payload.validate() {
        warn!(reason = %msg, "registration rejected");
        return Err(AppError::bad_request(msg));
    }

    let hasher = state.hasher.clone();
    let password = payload.password;
    let hash = tokio::task::spawn_blocking(move || hasher.hash(password.expose_secret()))
        .await
        .map_err(|e| {
            error!(error = %e, "hashing task failed");
            AppError::Internal
        })?
        .map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::Internal
        })?;

    let user = User::new(payload.name, payload.email, hash);
    match state.store.register(&user).await {
        Ok(()) => {
            info!(user_id = %user.id, "user registered");
            Ok(user)
        }
        Err(StoreError::EmailExists) => {
            warn!("email already registered");
            Err(AppError::conflict("email already exists"))
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            Err(AppError::Internal)
        }
    }
}

/// Checks credentials and returns a freshly issued token.
///
/// Unknown email and wrong password produce the same error, and both
/// spend one Argon2 verification.
pub async fn login_user(state: &AppState, payload: LoginRequest) -> AppResult<String> {
    let email = normalize_email(&payload.email);

    let user = match state.store.get_by_email(&email).await {
        Ok(u) => Some(u),
        Err(StoreError::UserNotFound) => None,
        Err(e) => {
            error!(error = %e, "get_by_email failed");
            return Err(AppError::Internal);
        }
    };

    let hasher = state.hasher.clone();
    let password = payload.password;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let matched = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => hasher.verify(password.expose_secret(), &hash),
        None => Ok(hasher.verify_decoy(password.expose_secret())),
    })
    .await
    .map_err(|e| {
        error!(error = %e, "verify task failed");
        AppError::Internal
    })?
    .map_err(|e| {
        error!(error = %e, "verify_password failed");
        AppError::Internal
    })?;

    let user = match (user, matched) {
        (Some(u), true) => u,
        (None, _) => {
            warn!("login unknown email");
            return Err(AppError::Unauthorized);
        }
        (Some(u), false) => {
            warn!(user_id = %u.id, "login invalid password");
            return Err(AppError::Unauthorized);
        }
    };

    let token = state.tokens.issue(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        AppError::Internal
    })?;
    info!(user_id = %user.id, "user logged in");
    Ok(token)
}
