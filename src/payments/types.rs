//! Payment provider types and data structures
//!
//! Records owned by the host application (profiles, purchase requests) and the
//! messages exchanged with the BaoKim gateway.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Gateway credentials configured by the host for one payment profile
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentProfile {
    /// Host-side identifier of the profile
    pub profile_id: String,
    /// Issuer identity sent as the `iss` claim
    pub api_key: String,
    /// Shared secret used for token and webhook signatures
    pub api_secret: String,
}

impl PaymentProfile {
    /// Reject profiles the gateway could never authenticate
    pub fn verify_config(&self) -> AppResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::configuration("Please enter a valid API key"));
        }
        if self.api_secret.trim().is_empty() {
            return Err(AppError::configuration("Please enter a valid API secret"));
        }
        Ok(())
    }
}

impl fmt::Debug for PaymentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProfile")
            .field("profile_id", &self.profile_id)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// The payer attached to a purchase request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    pub email: String,
}

/// A payable request, looked up by its merchant order key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseRequest {
    /// Merchant order key, sent to the gateway as `mrc_order_id`
    pub request_key: String,
    /// Amount the host expects to be paid
    pub cost_amount: Decimal,
    #[serde(default = "default_currency")]
    pub cost_currency: String,
    #[serde(default)]
    pub user: Option<User>,
    pub payment_profile_id: String,
}

fn default_currency() -> String {
    "VND".to_string()
}

/// Details of the thing being bought, supplied by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub cost: Decimal,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
    /// Optional contact fields such as `phone_number` and `customer_address`
    #[serde(default)]
    pub extra_data: HashMap<String, String>,
}

/// A payment channel offered by the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankChannel {
    #[serde(deserialize_with = "loose_u64")]
    pub id: u64,
    /// `1` marks a bank-transfer channel eligible for the selection list
    #[serde(rename = "type", default, deserialize_with = "loose_i64")]
    pub channel_type: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

impl BankChannel {
    pub const BANK_TRANSFER: i64 = 1;

    pub fn is_bank_transfer(&self) -> bool {
        self.channel_type == Self::BANK_TRANSFER
    }
}

/// Form parameters of one order creation attempt
///
/// The same value is posted as the form body and embedded in the token that
/// authorizes the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderCreationParams {
    pub mrc_order_id: String,
    pub total_amount: Decimal,
    pub description: String,
    pub url_success: String,
    pub url_detail: String,
    pub accept_bank: u8,
    pub accept_cc: u8,
    pub accept_qrpay: u8,
    pub webhooks: String,
    pub customer_email: String,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_address: Option<String>,
    pub lang: String,
    /// Selected payment channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm_id: Option<u64>,
}

/// Raw answer from the gateway, kept verbatim for the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: String,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body decoded as JSON, `None` when it is not a JSON object
    pub fn json_object(&self) -> Option<serde_json::Value> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .filter(|value| value.is_object())
    }
}

/// Where the payer is sent to complete the payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    pub url: String,
}

/// Data handed to the host's bank selection page
#[derive(Debug, Clone, Serialize)]
pub struct InitiateView {
    pub request_key: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub params: OrderCreationParams,
    pub bank_list: Vec<BankChannel>,
}

/// Payer's choice on the selection page
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ChannelSelection {
    /// `qrcode` or `momo` short-circuit the bank list
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Empty or non-numeric values from the form are treated as absent
    #[serde(default, deserialize_with = "loose_opt_u64")]
    pub bank_id: Option<u64>,
}

/// Audit log severity, mirrors the host's provider log types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Info,
    Payment,
    Error,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Payment => write!(f, "payment"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One audit record written to the host's provider log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderLogEntry {
    pub id: Uuid,
    pub request_key: String,
    pub provider_id: String,
    pub transaction_id: String,
    pub log_type: LogType,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn loose_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    json_u64(&value).ok_or_else(|| serde::de::Error::custom(format!("expected an id, got {value}")))
}

fn loose_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(json_u64(&value).and_then(|v| i64::try_from(v).ok()).unwrap_or_default())
}

fn loose_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(json_u64))
}

/// Scalar rendered as text; objects, arrays and null are absent
pub(crate) fn json_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Gateway ids arrive as numbers or numeric strings
pub(crate) fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bank_channel_accepts_string_ids() {
        let channel: BankChannel = serde_json::from_value(json!({
            "id": "151",
            "type": "1",
            "name": "Vietcombank"
        }))
        .unwrap();

        assert_eq!(channel.id, 151);
        assert!(channel.is_bank_transfer());
    }

    #[test]
    fn test_channel_selection_ignores_blank_bank_id() {
        let selection: ChannelSelection =
            serde_json::from_value(json!({"type": "qrcode", "bank_id": ""})).unwrap();
        assert_eq!(selection.kind.as_deref(), Some("qrcode"));
        assert_eq!(selection.bank_id, None);

        let selection: ChannelSelection =
            serde_json::from_value(json!({"bank_id": "151"})).unwrap();
        assert_eq!(selection.bank_id, Some(151));

        let selection: ChannelSelection =
            serde_json::from_value(json!({"bank_id": "abc"})).unwrap();
        assert_eq!(selection.bank_id, None);
    }

    #[test]
    fn test_verify_config_rejects_blank_credentials() {
        let mut profile = PaymentProfile {
            profile_id: "1".to_string(),
            api_key: "".to_string(),
            api_secret: "secret".to_string(),
        };
        assert!(profile.verify_config().is_err());

        profile.api_key = "key".to_string();
        profile.api_secret = "  ".to_string();
        assert!(profile.verify_config().is_err());

        profile.api_secret = "secret".to_string();
        assert!(profile.verify_config().is_ok());
    }

    #[test]
    fn test_profile_debug_redacts_secret() {
        let profile = PaymentProfile {
            profile_id: "1".to_string(),
            api_key: "key".to_string(),
            api_secret: "very-secret".to_string(),
        };
        assert!(!format!("{:?}", profile).contains("very-secret"));
    }

    #[test]
    fn test_json_object_rejects_non_objects() {
        let response = GatewayResponse::new(StatusCode::OK, "[1,2]");
        assert!(response.json_object().is_none());

        let response = GatewayResponse::new(StatusCode::OK, "not json");
        assert!(response.json_object().is_none());

        let response = GatewayResponse::new(StatusCode::OK, r#"{"data":{}}"#);
        assert!(response.json_object().is_some());
    }
}
