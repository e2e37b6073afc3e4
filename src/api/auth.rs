//! Session endpoints and the access-control middleware.
//!
//! The session lives entirely in the `token` cookie. `require_auth` guards
//! pages (failures redirect to the login page), `require_verified` guards
//! JSON endpoints (failures are 401/403).

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use metrics::counter;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::error::ApiError;
use super::metrics::AUTH_EVENTS_TOTAL;
use crate::auth::{Claims, TokenError, SESSION_COOKIE};
use crate::db::{LoginForm, RegisterForm, UserResponse, VerifyRequest};
use crate::AppState;

/// Build the session cookie for a freshly issued token
pub fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.auth.secure_cookie)
        .same_site(SameSite::Lax)
        .build()
}

fn token_from(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Decode the session cookie, if any
pub fn claims_from_jar(state: &AppState, jar: &CookieJar) -> Result<Claims, TokenError> {
    let token = token_from(jar);
    state.auth.tokens().verify(token.as_deref())
}

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<(CookieJar, Redirect), ApiError> {
    let session = state
        .auth
        .register(&form.email, &form.username, &form.password)
        .await
        .inspect_err(|_| {
            counter!(AUTH_EVENTS_TOTAL, "event" => "register", "outcome" => "failure").increment(1);
        })?;

    counter!(AUTH_EVENTS_TOTAL, "event" => "register", "outcome" => "success").increment(1);

    let jar = jar.add(session_cookie(&state, session.token));
    Ok((jar, Redirect::to("/verify")))
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), ApiError> {
    let session = state
        .auth
        .login(&form.username, &form.password)
        .await
        .inspect_err(|_| {
            counter!(AUTH_EVENTS_TOTAL, "event" => "login", "outcome" => "failure").increment(1);
        })?;

    counter!(AUTH_EVENTS_TOTAL, "event" => "login", "outcome" => "success").increment(1);

    let jar = jar.add(session_cookie(&state, session.token));
    Ok((jar, Redirect::to("/dashboard")))
}

/// POST /verify
///
/// Body `{"verificationCode": "NNNNNN"}`; the account is taken from the
/// session cookie. Answers 200 with a reissued, verified session.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<VerifyRequest>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let token = token_from(&jar);
    let session = state
        .auth
        .verify_email(token.as_deref(), &request.verification_code)
        .await
        .inspect_err(|_| {
            counter!(AUTH_EVENTS_TOTAL, "event" => "verify", "outcome" => "failure").increment(1);
        })?;

    counter!(AUTH_EVENTS_TOTAL, "event" => "verify", "outcome" => "success").increment(1);

    let jar = jar.add(session_cookie(&state, session.token));
    Ok((jar, Json(session.user.into())))
}

/// GET /logout
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    tracing::info!("User logged out");
    (jar, Redirect::to("/login"))
}

/// GET / and GET /dashboard: send the user to the page of their role
pub async fn dashboard(claims: Claims) -> Redirect {
    tracing::debug!(username = %claims.username, role = %claims.role, "Dashboard redirect");
    Redirect::to(claims.role.dashboard_path())
}

async fn serve_page(state: &AppState, file: &str, request: Request<Body>) -> Response {
    let path = state.config.server.static_dir.join(file);
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

pub async fn login_page(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    serve_page(&state, "login.html", request).await
}

pub async fn register_page(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    serve_page(&state, "register.html", request).await
}

pub async fn verify_page(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    serve_page(&state, "verify.html", request).await
}

/// GET /admin. Non-admins are sent to their own dashboard.
pub async fn admin_page(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    request: Request<Body>,
) -> Response {
    if !claims.is_admin() {
        return Redirect::to(claims.role.dashboard_path()).into_response();
    }
    serve_page(&state, "admin.html", request).await
}

pub async fn user_page(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    serve_page(&state, "user.html", request).await
}

/// Page guard: any token failure redirects to `/login`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match claims_from_jar(&state, &jar) {
        Ok(claims) => {
            tracing::debug!(username = %claims.username, role = %claims.role, "Authenticated request");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::info!(path = %request.uri().path(), reason = %e, "Unauthenticated page access");
            Redirect::to("/login").into_response()
        }
    }
}

/// API guard: 401 without a valid session, 403 until the email is verified.
pub async fn require_verified(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = claims_from_jar(&state, &jar)?;

    if !claims.verified {
        return Err(ApiError::forbidden("Verification required"));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Pages behind a session must not be cached by the browser
pub async fn no_cache(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response
}

pub fn require_admin(claims: &Claims) -> Result<(), ApiError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

/// Claims placed in the request extensions by one of the guards above
#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, cookie_value, seed_user, test_state};
    use crate::db::Role;
    use axum::{http::StatusCode, middleware, routing::get, Router};

    fn guarded_router(state: Arc<AppState>) -> Router {
        let pages = Router::new()
            .route("/dashboard", get(dashboard))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth));
        let api = Router::new()
            .route("/whoami", get(|claims: Claims| async move { claims.username }))
            .layer(middleware::from_fn_with_state(state.clone(), require_verified));
        Router::new().merge(pages).merge(api).with_state(state)
    }

    fn with_cookie(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_require_auth_redirects_without_cookie() {
        let state = test_state().await;
        let response = guarded_router(state)
            .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_require_auth_redirects_on_garbage_token() {
        let state = test_state().await;
        let response = guarded_router(state)
            .oneshot(with_cookie("/dashboard", "not.a.jwt"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_dashboard_redirects_by_role() {
        let state = test_state().await;
        let admin = seed_user(&state, "alice", Role::Admin, true).await;
        let user = seed_user(&state, "bob", Role::User, false).await;

        let response = guarded_router(state.clone())
            .oneshot(with_cookie("/dashboard", &admin))
            .await
            .unwrap();
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/admin");

        let response = guarded_router(state)
            .oneshot(with_cookie("/dashboard", &user))
            .await
            .unwrap();
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/user");
    }

    #[tokio::test]
    async fn test_require_verified_statuses() {
        let state = test_state().await;
        let verified = seed_user(&state, "alice", Role::User, true).await;
        let unverified = seed_user(&state, "bob", Role::User, false).await;

        let response = guarded_router(state.clone())
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = guarded_router(state.clone())
            .oneshot(with_cookie("/whoami", &unverified))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "forbidden");

        let response = guarded_router(state)
            .oneshot(with_cookie("/whoami", &verified))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_sets_cookie_and_redirects() {
        let state = test_state().await;
        let app = Router::new()
            .route("/register", axum::routing::post(register))
            .with_state(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("email=a%40example.com&username=alice&password=password-1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/verify");

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Path=/"));

        let token = cookie_value(&set_cookie);
        let claims = state.auth.tokens().verify(Some(&token)).unwrap();
        assert_eq!(claims.role, Role::Admin);
        assert!(!claims.verified);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("token=abc"));
        let response = logout(CookieJar::from_headers(&headers)).await.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");

        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_require_admin() {
        let mut claims = Claims {
            sub: "u1".into(),
            username: "bob".into(),
            role: Role::User,
            email: "b@example.com".into(),
            verified: true,
            iss: "storefront".into(),
            aud: "storefront".into(),
            iat: 0,
            nbf: 0,
            exp: 0,
        };
        assert_eq!(require_admin(&claims).unwrap_err().status(), StatusCode::FORBIDDEN);

        claims.role = Role::Admin;
        assert!(require_admin(&claims).is_ok());
    }
}
