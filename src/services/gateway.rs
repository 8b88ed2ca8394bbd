use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

/// Everything the gateway needs to open a hosted payment session.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayChargeRequest {
    /// Our order number; echoed back by the gateway as `tran_id`
    pub tran_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub product_name: String,
    /// Opaque passthrough values returned untouched in every callback
    pub value_a: Option<String>,
    pub value_b: Option<String>,
    pub value_c: Option<String>,
    pub value_d: Option<String>,
}

/// A session the customer can be redirected into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub session_key: Option<String>,
    pub redirect_url: String,
}

/// Wire shape of the gateway's session-create response. Only the fields we
/// act on; everything else is ignored.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: Option<String>,
    #[serde(rename = "sessionkey")]
    session_key: Option<String>,
    #[serde(rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
    #[serde(rename = "failedreason")]
    failed_reason: Option<String>,
}

/// Seam for the payment provider so tests can settle orders without the
/// network.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: &GatewayChargeRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// SSLCommerz-style hosted checkout client. Sends a form POST with store
/// credentials and receives a redirect URL for the customer.
pub struct HostedGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HostedGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    fn session_url(&self) -> String {
        format!(
            "{}/gwprocess/v4/api.php",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn callback_url(&self, leg: &str) -> String {
        format!(
            "{}/api/v1/payments/callback/{}",
            self.config.callback_base_url.trim_end_matches('/'),
            leg
        )
    }

    fn ipn_url(&self) -> String {
        format!(
            "{}/api/v1/payments/ipn",
            self.config.callback_base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl PaymentGateway for HostedGateway {
    #[instrument(skip(self, request), fields(tran_id = %request.tran_id))]
    async fn create_session(
        &self,
        request: &GatewayChargeRequest,
    ) -> Result<GatewaySession, ServiceError> {
        if request.tran_id.is_empty() {
            return Err(ServiceError::MissingData(
                "Transaction id is required".to_string(),
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Charge amount must be positive".to_string(),
            ));
        }
        if request.customer_name.trim().is_empty() || request.customer_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name and address are required".to_string(),
            ));
        }

        let mut form: Vec<(&str, String)> = vec![
            ("store_id", self.config.store_id.clone()),
            ("store_passwd", self.config.store_passwd.clone()),
            ("total_amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("tran_id", request.tran_id.clone()),
            ("success_url", self.callback_url("success")),
            ("fail_url", self.callback_url("fail")),
            ("cancel_url", self.callback_url("cancel")),
            ("ipn_url", self.ipn_url()),
            ("cus_name", request.customer_name.clone()),
            ("cus_email", request.customer_email.clone()),
            ("cus_phone", request.customer_phone.clone()),
            ("cus_add1", request.customer_address.clone()),
            ("cus_city", "Dhaka".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            ("shipping_method", "NO".to_string()),
            ("product_name", request.product_name.clone()),
            ("product_category", "groceries".to_string()),
            ("product_profile", "physical-goods".to_string()),
        ];
        for (key, value) in [
            ("value_a", &request.value_a),
            ("value_b", &request.value_b),
            ("value_c", &request.value_c),
            ("value_d", &request.value_d),
        ] {
            if let Some(v) = value {
                form.push((key, v.clone()));
            }
        }

        let response = self
            .client
            .post(self.session_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway request failed: {}", e);
                ServiceError::GatewayError(format!("Gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::GatewayError(format!(
                "Gateway returned HTTP {}",
                status
            )));
        }

        let body: SessionResponse = response.json().await.map_err(|e| {
            error!("Gateway response could not be parsed: {}", e);
            ServiceError::GatewayError(format!("Invalid gateway response: {}", e))
        })?;

        match body.status.as_deref() {
            Some("SUCCESS") => {
                let redirect_url = body.gateway_page_url.ok_or_else(|| {
                    ServiceError::GatewayError(
                        "Gateway reported success without a redirect URL".to_string(),
                    )
                })?;
                Ok(GatewaySession {
                    session_key: body.session_key,
                    redirect_url,
                })
            }
            other => {
                let reason = body
                    .failed_reason
                    .unwrap_or_else(|| format!("status={}", other.unwrap_or("missing")));
                Err(ServiceError::GatewayError(format!(
                    "Session rejected: {}",
                    reason
                )))
            }
        }
    }
}
