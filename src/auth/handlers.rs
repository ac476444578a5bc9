use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        cookie::{clear_session_cookie, session_cookie},
        dto::{Data, LoginRequest, PublicUser, RegisterRequest, UserBody},
        gate::{require_auth, CurrentUser},
        services::{login_user, register_user},
    },
    errors::{AppError, AppResult},
    state::AppState,
};

const INVALID_PAYLOAD: &str = "invalid payload";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn me_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "rejected request body");
        AppError::bad_request(INVALID_PAYLOAD)
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user = register_user(&state, body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(Data::new(UserBody {
            user: PublicUser::from(user),
        })),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let token = login_user(&state, body(payload)?).await?;
    let cookie = session_cookie(&token, state.tokens.ttl(), state.config.cookie_secure)
        .map_err(|e| {
            error!(error = %e, "failed to build session cookie");
            AppError::Internal
        })?;
    Ok((StatusCode::OK, [(SET_COOKIE, cookie)]))
}

/// Drops the client's cookie. The token itself stays valid until it expires.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, clear_session_cookie(state.config.cookie_secure))],
    )
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<Data<UserBody>> {
    Json(Data::new(UserBody {
        user: PublicUser::from(user),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::COOKIE, Request, Response},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        app::build_app,
        auth::jwt::Claims,
        users::{
            testing::{CountingStore, FailingStore},
            MemoryUserStore, UserStore,
        },
    };

    use super::*;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(COOKIE, c);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn json_body(resp: Response<Body>) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn session_token(resp: &Response<Body>) -> String {
        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .expect("set-cookie")
            .to_str()
            .expect("ascii");
        cookie
            .split(';')
            .next()
            .and_then(|kv| kv.strip_prefix("Authorization="))
            .expect("session cookie")
            .to_string()
    }

    fn john() -> Value {
        json!({
            "name": "john doe",
            "email": "johndoe@hotmail.com",
            "password": "mytopsecretlongpassword",
        })
    }

    async fn register_and_login(state: &AppState) -> String {
        let app = build_app(state.clone());
        let resp = app
            .clone()
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("register");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = app
            .oneshot(post_json(
                "/api/v1/login",
                json!({"email": "johndoe@hotmail.com", "password": "mytopsecretlongpassword"}),
            ))
            .await
            .expect("login");
        assert_eq!(resp.status(), StatusCode::OK);
        session_token(&resp)
    }

    #[tokio::test]
    async fn register_echoes_user_without_password() {
        let app = build_app(AppState::fake());
        let resp = app
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get("content-type").expect("content-type"),
            "application/json"
        );

        let body = json_body(resp).await;
        let user = &body["data"]["user"];
        assert_eq!(user["name"], "john doe");
        assert_eq!(user["email"], "johndoe@hotmail.com");
        assert!(user["id"].is_string());
        assert!(user["createdAt"].is_string());
        assert!(user["updatedAt"].is_string());
        let raw = body.to_string();
        assert!(!raw.contains("mytopsecretlongpassword"));
        assert!(!raw.contains("argon2"));
        assert!(user.get("password").is_none());
    }

    #[tokio::test]
    async fn register_with_empty_fields_is_bad_request_without_storage() {
        let store = Arc::new(CountingStore::default());
        let app = build_app(AppState::fake_with_store(store.clone()));
        let resp = app
            .oneshot(post_json(
                "/api/v1/register",
                json!({"name": "john doe", "email": "", "password": ""}),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"]["message"].is_string());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn register_with_invalid_email_is_bad_request() {
        let app = build_app(AppState::fake());
        let resp = app
            .oneshot(post_json(
                "/api/v1/register",
                json!({"name": "john doe", "email": "invalid", "password": "secret"}),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_with_short_password_is_bad_request() {
        let app = build_app(AppState::fake());
        let resp = app
            .oneshot(post_json(
                "/api/v1/register",
                json!({"name": "john doe", "email": "johndoe@hotmail.com", "password": "secret"}),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = build_app(AppState::fake());
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/register")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let resp = app.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["message"], INVALID_PAYLOAD);
    }

    #[tokio::test]
    async fn duplicate_register_is_conflict() {
        let app = build_app(AppState::fake());
        let first = app
            .clone()
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = app
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn register_storage_failure_is_opaque_500() {
        let app = build_app(AppState::fake_with_store(Arc::new(FailingStore)));
        let resp = app
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await.to_string();
        assert!(!body.to_lowercase().contains("pool"));
    }

    #[tokio::test]
    async fn login_sets_http_only_cookie_for_one_hour() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        app.clone()
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("register");
        let resp = app
            .oneshot(post_json(
                "/api/v1/login",
                json!({"email": "johndoe@hotmail.com", "password": "mytopsecretlongpassword"}),
            ))
            .await
            .expect("login");
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .expect("set-cookie")
            .to_str()
            .expect("ascii")
            .to_string();
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(state.tokens.verify(&session_token(&resp)).is_ok());
    }

    #[tokio::test]
    async fn login_failures_look_identical() {
        let app = build_app(AppState::fake());
        app.clone()
            .oneshot(post_json("/api/v1/register", john()))
            .await
            .expect("register");

        let unknown = app
            .clone()
            .oneshot(post_json(
                "/api/v1/login",
                json!({"email": "test@test.com", "password": "password"}),
            ))
            .await
            .expect("response");
        let wrong = app
            .oneshot(post_json(
                "/api/v1/login",
                json!({"email": "johndoe@hotmail.com", "password": "wrong-password"}),
            ))
            .await
            .expect("response");

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert!(unknown.headers().get(SET_COOKIE).is_none());
        assert!(wrong.headers().get(SET_COOKIE).is_none());
        assert_eq!(json_body(unknown).await, json_body(wrong).await);
    }

    #[tokio::test]
    async fn me_returns_caller() {
        let state = AppState::fake();
        let token = register_and_login(&state).await;
        let resp = build_app(state)
            .oneshot(get_with_cookie(
                "/api/v1/me",
                Some(&format!("Authorization={token}")),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["user"]["email"], "johndoe@hotmail.com");
        assert!(body["data"]["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn me_without_cookie_and_with_bad_token_look_identical() {
        let app = build_app(AppState::fake());
        let missing = app
            .clone()
            .oneshot(get_with_cookie("/api/v1/me", None))
            .await
            .expect("response");
        let bad = app
            .oneshot(get_with_cookie("/api/v1/me", Some("Authorization=garbage")))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(missing).await, json_body(bad).await);
    }

    #[tokio::test]
    async fn me_with_expired_token_is_unauthorized() {
        let state = AppState::fake();
        let token = register_and_login(&state).await;
        let subject = state.tokens.verify(&token).expect("valid");
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let expired = state
            .tokens
            .sign(&Claims {
                sub: subject,
                iat: now - 7200,
                exp: now - 3600,
            })
            .expect("sign");

        let resp = build_app(state)
            .oneshot(get_with_cookie(
                "/api/v1/me",
                Some(&format!("Authorization={expired}")),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_after_account_deletion_is_unauthorized() {
        let store = Arc::new(MemoryUserStore::new());
        let state = AppState::fake_with_store(store.clone());
        let token = register_and_login(&state).await;
        let user = store
            .get_by_email("johndoe@hotmail.com")
            .await
            .expect("registered");
        store.remove(user.id).await.expect("removed");

        let resp = build_app(state)
            .oneshot(get_with_cookie(
                "/api/v1/me",
                Some(&format!("Authorization={token}")),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_with_failing_store_is_internal_error() {
        let state = AppState::fake_with_store(Arc::new(FailingStore));
        let token = state.tokens.issue(Uuid::new_v4()).expect("issue");
        let resp = build_app(state)
            .oneshot(get_with_cookie(
                "/api/v1/me",
                Some(&format!("Authorization={token}")),
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await["error"]["message"],
            "internal server error"
        );
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = build_app(AppState::fake());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/logout")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let cookie = resp.headers().get(SET_COOKIE).expect("set-cookie");
        assert!(cookie.to_str().expect("ascii").contains("Max-Age=0"));
    }
}
