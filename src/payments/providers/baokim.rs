//! BaoKim payment gateway client
//!
//! This module provides integration with BaoKim's v4 payment API for
//! processing VND payments: channel listing, order creation and order detail
//! lookup. Every call is a single timeout-bound attempt.

use crate::error::{AppError, AppResult, ExternalError};
use crate::payments::protocol::{ProtocolProfile, ProtocolVariant};
use crate::payments::token::TokenIssuer;
use crate::payments::traits::{Clock, PaymentGateway};
use crate::payments::types::{BankChannel, GatewayResponse, OrderCreationParams, PaymentProfile};
use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PROVIDER_ID: &str = "tpb_baokim";
pub const PROVIDER_TITLE: &str = "BaoKim";

const LIVE_URL: &str = "https://api.baokim.vn";
const SANDBOX_URL: &str = "https://sandbox-api.baokim.vn";

/// BaoKim gateway configuration
#[derive(Debug, Clone)]
pub struct BaoKimConfig {
    /// Send traffic to the live host instead of the sandbox
    pub live_payments: bool,
    pub live_url: String,
    pub sandbox_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub protocol: ProtocolProfile,
}

impl Default for BaoKimConfig {
    fn default() -> Self {
        Self {
            live_payments: false,
            live_url: LIVE_URL.to_string(),
            sandbox_url: SANDBOX_URL.to_string(),
            timeout_secs: 30,
            protocol: ProtocolVariant::Payment.profile(),
        }
    }
}

impl BaoKimConfig {
    /// Create config from environment variables
    pub fn from_env() -> AppResult<Self> {
        let live_payments = std::env::var("ENABLE_LIVE_PAYMENTS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let live_url = std::env::var("BAOKIM_LIVE_URL").unwrap_or_else(|_| LIVE_URL.to_string());
        let sandbox_url =
            std::env::var("BAOKIM_SANDBOX_URL").unwrap_or_else(|_| SANDBOX_URL.to_string());

        let timeout_secs = std::env::var("BAOKIM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let variant: ProtocolVariant = std::env::var("BAOKIM_PROTOCOL")
            .unwrap_or_else(|_| "payment".to_string())
            .parse()
            .map_err(AppError::configuration)?;

        let mut protocol = variant.profile();
        if let Ok(strategy) = std::env::var("BAOKIM_AUTH_STRATEGY") {
            protocol = protocol.with_auth(strategy.parse().map_err(AppError::configuration)?);
        }

        Ok(Self {
            live_payments,
            live_url,
            sandbox_url,
            timeout_secs,
            protocol,
        })
    }

    /// Base URL chosen by the live payments flag
    pub fn endpoint(&self) -> &str {
        let url = if self.live_payments {
            &self.live_url
        } else {
            &self.sandbox_url
        };
        url.trim_end_matches('/')
    }
}

/// BaoKim gateway client
pub struct BaoKimClient {
    config: BaoKimConfig,
    client: Client,
    tokens: TokenIssuer,
}

impl BaoKimClient {
    pub fn new(config: BaoKimConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("baokim-payment/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "BaoKim client initialized: endpoint={}, protocol={}, auth={:?}",
            config.endpoint(),
            config.protocol.variant,
            config.protocol.auth
        );

        Ok(Self {
            config,
            client,
            tokens: TokenIssuer::new(clock),
        })
    }

    /// Recurring billing is not offered by this integration
    pub fn supports_recurring(&self) -> bool {
        false
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint(), path)
    }

    fn transport_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            ExternalError::Timeout {
                provider: PROVIDER_TITLE.to_string(),
                seconds: self.config.timeout_secs,
            }
            .into()
        } else {
            ExternalError::PaymentProvider {
                provider: PROVIDER_TITLE.to_string(),
                message: err.to_string(),
            }
            .into()
        }
    }
}

#[async_trait]
impl PaymentGateway for BaoKimClient {
    async fn list_channels(&self, profile: &PaymentProfile) -> Vec<BankChannel> {
        let token = match self.tokens.issue(profile, &json!([])) {
            Ok(token) => token,
            Err(e) => {
                error!("Could not sign bank list token: {}", e);
                return Vec::new();
            }
        };

        let url = self.url(ProtocolProfile::BANK_LIST_PATH);
        debug!("Fetching BaoKim bank list: {}", url);

        let response = match self.client.get(&url).query(&[("jwt", token)]).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("BaoKim bank list request failed: {}", e);
                return Vec::new();
            }
        };

        if response.status() != StatusCode::OK {
            warn!("BaoKim bank list returned HTTP {}", response.status());
            return Vec::new();
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("BaoKim bank list is not valid JSON: {}", e);
                return Vec::new();
            }
        };

        let channels: Vec<BankChannel> = body
            .get("data")
            .and_then(|data| data.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        info!("Fetched {} BaoKim payment channels", channels.len());
        channels
    }

    async fn create_order(
        &self,
        profile: &PaymentProfile,
        params: &OrderCreationParams,
    ) -> AppResult<GatewayResponse> {
        let token = self.tokens.issue(profile, params)?;
        let url = self.url(&self.config.protocol.order_send_path());

        info!(
            "Creating BaoKim order: mrc_order_id={}, amount={}, bpm_id={:?}",
            params.mrc_order_id, params.total_amount, params.bpm_id
        );

        let response = self
            .client
            .post(&url)
            .query(&[("jwt", token)])
            .form(params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        debug!(
            "BaoKim order send answered HTTP {} for {}",
            status, params.mrc_order_id
        );
        Ok(GatewayResponse::new(status, body))
    }

    async fn fetch_order_detail(
        &self,
        profile: &PaymentProfile,
        order_id: &str,
        merchant_order_id: &str,
    ) -> AppResult<GatewayResponse> {
        let url = self.url(&self.config.protocol.order_detail_path());

        let mut query = vec![
            ("id", order_id.to_string()),
            ("mrc_order_id", merchant_order_id.to_string()),
        ];
        if self.config.protocol.detail_requires_token {
            query.push(("jwt", self.tokens.issue(profile, &json!([]))?));
        }

        debug!(
            "Fetching BaoKim order detail: id={}, mrc_order_id={}",
            order_id, merchant_order_id
        );

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                "BaoKim order detail returned HTTP {} for {}",
                status, merchant_order_id
            );
            return Err(ExternalError::UnexpectedStatus {
                provider: PROVIDER_TITLE.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            }
            .into());
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok(GatewayResponse::new(status, body))
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint()
    }
}
