//! Request gate: cookie → token → account → handler.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};

use super::{cookie::extract_session_token, jwt::TokenService};
use crate::{
    errors::AppError,
    state::AppState,
    users::{StoreError, User, UserStore},
};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token subject no longer exists")]
    UnknownSubject,
    #[error("user lookup failed: {0}")]
    Storage(#[source] StoreError),
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingToken | GateError::InvalidToken | GateError::UnknownSubject => {
                AppError::Unauthorized
            }
            GateError::Storage(_) => AppError::Internal,
        }
    }
}

/// Resolves the caller's identity from request headers.
///
/// Stages run strictly in order and stop at the first failure:
/// extract the cookie, verify the token, resolve the subject.
pub struct AuthGate<'a> {
    tokens: &'a TokenService,
    store: &'a dyn UserStore,
}

impl<'a> AuthGate<'a> {
    pub fn new(tokens: &'a TokenService, store: &'a dyn UserStore) -> Self {
        Self { tokens, store }
    }

    pub async fn authorize(&self, headers: &HeaderMap) -> Result<User, GateError> {
        let token = extract_session_token(headers).ok_or(GateError::MissingToken)?;
        let subject = self
            .tokens
            .verify(&token)
            .map_err(|_| GateError::InvalidToken)?;
        match self.store.get_by_id(subject).await {
            Ok(user) => Ok(user),
            Err(StoreError::UserNotFound) => Err(GateError::UnknownSubject),
            Err(e) => Err(GateError::Storage(e)),
        }
    }
}

/// Authenticated account attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Middleware guarding every route it is layered on.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let gate = AuthGate::new(&state.tokens, state.store.as_ref());
    let user = match gate.authorize(request.headers()).await {
        Ok(user) => user,
        Err(GateError::Storage(e)) => {
            error!(error = %e, "auth gate: user lookup failed");
            return Err(AppError::Internal);
        }
        Err(e @ GateError::MissingToken) => {
            debug!(reason = %e, "auth gate rejected request");
            return Err(e.into());
        }
        Err(e) => {
            warn!(reason = %e, "auth gate rejected request");
            return Err(e.into());
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
