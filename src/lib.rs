pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod notifications;
pub mod payments;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::{AuthService, TokenCodec};
use crate::chat::ChatHub;
use crate::notifications::SystemEmailService;
use crate::payments::PaymentClient;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub auth: AuthService,
    pub rate_limiter: Arc<RateLimiter>,
    pub chat_hub: ChatHub,
    pub email: Arc<SystemEmailService>,
    pub payments: PaymentClient,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> anyhow::Result<Self> {
        let email = Arc::new(SystemEmailService::new(config.email.clone()));
        let tokens = TokenCodec::from_config(&config.auth);
        let auth = AuthService::new(db.clone(), tokens, email.clone());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let payments = PaymentClient::new(&config.payment)?;

        Ok(Self {
            config,
            db,
            auth,
            rate_limiter,
            chat_hub: ChatHub::new(),
            email,
            payments,
            metrics_handle: None,
        })
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
