use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Body of `POST /orders` on the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayOrderRequest {
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub payment_capture: u8,
}

impl GatewayOrderRequest {
    pub fn new(amount: i64, currency: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            receipt: receipt.into(),
            payment_capture: 1,
        }
    }
}

/// Order reference returned by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outbound payment gateway. Implementations fail closed: any transport,
/// timeout or protocol problem is a [`ServiceError::GatewayError`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError>;
}

/// Razorpay-compatible HTTP client.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for HttpPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            cfg.payment_gateway_url.clone(),
            cfg.payment_key_id.clone(),
            cfg.payment_key_secret.clone(),
            cfg.payment_gateway_timeout(),
        )
    }

    async fn post_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, ServiceError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::GatewayError("gateway request timed out".to_string())
                } else {
                    ServiceError::GatewayError(format!("gateway unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Gateway rejected order creation");
            return Err(ServiceError::GatewayError(format!(
                "gateway returned {status}"
            )));
        }

        let order: GatewayOrder = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed gateway response: {e}")))?;

        if order.id.is_empty() {
            return Err(ServiceError::GatewayError(
                "gateway response is missing an order id".to_string(),
            ));
        }
        if order.amount != request.amount {
            return Err(ServiceError::GatewayError(format!(
                "gateway echoed amount {} for a request of {}",
                order.amount, request.amount
            )));
        }

        Ok(order)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(amount = request.amount, receipt = %request.receipt))]
    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let started = Instant::now();
        let result = self.post_order(request).await;
        histogram!(
            "storefront_gateway.latency_ms",
            started.elapsed().as_millis() as f64
        );

        if let Err(e) = &result {
            counter!("storefront_gateway.failures", 1);
            warn!(error = %e, "Payment gateway call failed");
        }
        result
    }
}
