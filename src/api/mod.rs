pub mod auth;
mod cart;
mod chats;
mod email;
pub mod error;
pub mod metrics;
mod products;
pub mod rate_limit;
mod users;
mod validation;
mod ws;

use axum::{
    handler::Handler,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let limited = middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit);
    let verified = middleware::from_fn_with_state(state.clone(), auth::require_verified);

    // Landing redirects (rate limited, session required)
    let dashboard_routes = Router::new()
        .route("/", get(auth::dashboard))
        .route("/dashboard", get(auth::dashboard))
        .layer(middleware::from_fn(auth::no_cache))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .layer(limited.clone());

    // Role pages
    let page_routes = Router::new()
        .route("/admin", get(auth::admin_page))
        .route("/user", get(auth::user_page))
        .layer(middleware::from_fn(auth::no_cache))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    // Session routes (public; only the form posts are rate limited)
    let session_routes = Router::new()
        .route(
            "/login",
            get(auth::login_page).post(auth::login.layer(limited.clone())),
        )
        .route(
            "/register",
            get(auth::register_page).post(auth::register.layer(limited)),
        )
        .route("/verify", get(auth::verify_page).post(auth::verify))
        .route("/logout", get(auth::logout));

    // Catalog reads are public, writes need a verified session
    let product_routes = Router::new().route(
        "/products",
        get(products::list_products)
            .post(products::create_product.layer(verified.clone()))
            .put(products::update_product.layer(verified.clone()))
            .delete(products::delete_product.layer(verified.clone())),
    );

    // JSON endpoints behind a verified session
    let api_routes = Router::new()
        .route("/cart", post(cart::checkout))
        .route("/send_email", post(email::send_email))
        .route("/get_users_email_list", get(email::users_email_list))
        .route("/users", get(users::list_users))
        .route("/api/users/:id/role", put(users::update_user_role))
        .route("/api/active-chats", get(chats::active_chats))
        .route("/api/active-chat", get(chats::active_chat))
        .route("/api/chat-history", get(chats::chat_history))
        .layer(verified);

    // Assets live directly in static_dir and answer both at the root and under /static
    let static_files = ServeDir::new(&state.config.server.static_dir);
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .route("/ws", get(ws::chat_ws))
        .merge(dashboard_routes)
        .merge(page_routes)
        .merge(session_routes)
        .merge(product_routes)
        .merge(api_routes)
        .nest_service("/static", static_files.clone())
        .fallback_service(static_files)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Shared fixtures for the router-level tests of every handler module
#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::{header, Method, Request},
        response::Response,
        routing::post,
        Json, Router,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::create_router;
    use crate::auth::SESSION_COOKIE;
    use crate::config::Config;
    use crate::db::{self, Role, User};
    use crate::payments::{PaymentRequest, PaymentResponse};
    use crate::AppState;

    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.rate_limit.enabled = false;
        config.server.static_dir = std::env::temp_dir().join("storefront-test-no-static");
        config
    }

    pub async fn state_with_config(config: Config) -> Arc<AppState> {
        let db = db::init_memory().await.unwrap();
        Arc::new(AppState::new(config, db).unwrap())
    }

    pub async fn test_state() -> Arc<AppState> {
        state_with_config(test_config()).await
    }

    pub async fn state_with_payment_url(url: String) -> Arc<AppState> {
        let mut config = test_config();
        config.payment.url = url;
        state_with_config(config).await
    }

    /// Insert an account directly and return a session token for it
    pub async fn seed_user(state: &AppState, username: &str, role: Role, verified: bool) -> String {
        let user: User = sqlx::query_as(
            "INSERT INTO users (id, email, username, password_hash, role, verified) VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(format!("{}@example.com", username))
        .bind(username)
        .bind("not-a-real-hash")
        .bind(role.to_string())
        .bind(verified)
        .fetch_one(&state.db)
        .await
        .unwrap();

        state.auth.tokens().issue(&user).unwrap()
    }

    pub async fn verified_admin(state: &AppState) -> String {
        seed_user(state, "admin", Role::Admin, true).await
    }

    pub async fn verified_user(state: &AppState) -> String {
        seed_user(state, "user", Role::User, true).await
    }

    pub async fn unverified_user(state: &AppState) -> String {
        seed_user(state, "pending", Role::User, false).await
    }

    pub async fn seed_product(state: &AppState, name: &str, price: f64, category: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO products (id, name, price, category) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(price)
            .bind(category)
            .execute(&state.db)
            .await
            .unwrap();
        id
    }

    /// Run one request through the full router
    pub async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        create_router(state.clone()).oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        if bytes.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Value part of a `Set-Cookie` header
    pub fn cookie_value(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
            .unwrap_or_default()
    }

    /// Payment collaborator on an ephemeral port that answers every charge
    /// with `status` and the summed cart total
    pub async fn fake_payment_service(status: &'static str) -> String {
        let app = Router::new().route(
            "/pay",
            post(move |Json(req): Json<PaymentRequest>| async move {
                let total: f64 = req.items.iter().map(|i| i.price * i.quantity as f64).sum();
                Json(PaymentResponse {
                    status: status.to_string(),
                    total_amount: total,
                    currency: req.currency,
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/pay", addr)
    }
}
