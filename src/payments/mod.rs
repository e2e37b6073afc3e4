//! Client for the external payment service.
//!
//! The storefront never charges anything itself: the cart is forwarded as one
//! JSON request to the configured payment endpoint and the answer decides
//! whether an order is recorded.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::PaymentConfig;
use crate::db::CartLine;

/// Payment method reported to the payment service
pub const DEFAULT_PAYMENT_METHOD: &str = "card";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("error making payment request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment service answered with status {0}")]
    Status(u16),
    #[error("error decoding payment response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentItem {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub currency: String,
    pub items: Vec<PaymentItem>,
    pub customer_name: String,
    pub email: String,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub status: String,
    pub total_amount: f64,
    pub currency: String,
}

impl PaymentResponse {
    /// `success` and `completed` both mean the charge went through
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success") || self.status.eq_ignore_ascii_case("completed")
    }
}

/// Who is paying
#[derive(Debug, Clone)]
pub struct Customer<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

#[derive(Clone)]
pub struct PaymentClient {
    url: String,
    currency: String,
    client: reqwest::Client,
}

impl PaymentClient {
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            url: config.url.clone(),
            currency: config.currency.clone(),
            client,
        })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Build the request body for a cart
    pub fn request_for(&self, cart: &[CartLine], customer: &Customer<'_>) -> PaymentRequest {
        PaymentRequest {
            currency: self.currency.clone(),
            items: cart
                .iter()
                .map(|line| PaymentItem {
                    name: line.name.clone(),
                    price: line.price,
                    quantity: line.quantity,
                })
                .collect(),
            customer_name: customer.name.to_string(),
            email: customer.email.to_string(),
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }

    /// Send one charge request. No retries.
    pub async fn charge(
        &self,
        cart: &[CartLine],
        customer: &Customer<'_>,
    ) -> Result<PaymentResponse, PaymentError> {
        if cart.is_empty() {
            return Err(PaymentError::EmptyCart);
        }

        let body = self.request_for(cart, customer);

        tracing::info!(
            customer = %customer.name,
            items = body.items.len(),
            currency = %body.currency,
            "Forwarding cart to payment service"
        );

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(PaymentError::Status(response.status().as_u16()));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Decode(e.to_string()))?;

        tracing::info!(
            status = %payment.status,
            total = payment.total_amount,
            "Payment service answered"
        );

        Ok(payment)
    }
}
