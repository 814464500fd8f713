//! BaoKim payment notifications
//!
//! An inbound notification goes through a fixed sequence of steps, each of
//! which may end processing:
//!
//! 1. [`CallbackState::setup`] decodes the body defensively.
//! 2. The purchase request and its payment profile are resolved by the
//!    merchant order key.
//! 3. The notification is authenticated, either by its HMAC signature or by
//!    re-reading the order from the gateway and trusting only that copy.
//! 4. The reconciled amount is compared with the expected cost.
//! 5. `order.stat == "c"` marks the payment as received.
//!
//! Whatever step processing stops at, the notification is written to the
//! provider log exactly once.

use crate::error::{AppError, AppResult, ExternalError, InfrastructureError};
use crate::payments::protocol::{AuthStrategy, CostRule, ProtocolProfile};
use crate::payments::providers::baokim::{PROVIDER_ID, PROVIDER_TITLE};
use crate::payments::traits::{
    Clock, PaymentGateway, PaymentProfileStore, ProviderLogSink, PurchaseCompleter,
    PurchaseRequestStore,
};
use crate::payments::types::{
    json_string, LogType, PaymentProfile, ProviderLogEntry, PurchaseRequest,
};
use hmac::{Hmac, Mac};
use http::StatusCode;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const MSG_UNEXPECTED_VALUES: &str =
    "Data received from BaoKim does not contain the expected values.";
pub const MSG_NOT_VERIFIED: &str = "Data received from BaoKim could not be verified as valid.";
pub const MSG_ORDER_MISMATCH: &str = "Mismatch order ID.";
pub const MSG_INVALID_COST: &str = "Invalid cost amount";
pub const MSG_NO_ACTION: &str = "OK, no action";

/// Response code used when a failed step did not choose one
pub const DEFAULT_FAILURE_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// Status code of a completed payment
const STAT_COMPLETED: &str = "c";

/// Acknowledgement the gateway expects for a processed payment
pub fn success_message() -> String {
    json!({"err_code": 0, "message": "ok"}).to_string()
}

/// The `order`, `txn` and `sign` parts of a notification
///
/// Missing or wrongly shaped parts decode to empty defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackInput {
    pub order: Map<String, Value>,
    pub txn: Map<String, Value>,
    pub sign: String,
}

impl CallbackInput {
    fn from_json(json: &Map<String, Value>) -> Self {
        let object = |key: &str| {
            json.get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        Self {
            order: object("order"),
            txn: object("txn"),
            sign: json.get("sign").and_then(json_string).unwrap_or_default(),
        }
    }

    /// Payload covered by the signature: everything but `sign`
    fn signed_payload(&self) -> Value {
        json!({
            "order": self.order,
            "txn": self.txn,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentResult {
    #[default]
    Unknown,
    Received,
}

/// Why processing of a notification stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFailure {
    /// Required values missing or not resolvable
    Structural,
    /// Signature or reconciled order did not match
    Authentication,
    /// The gateway could not be reached or answered nonsense
    Transport,
    /// Cost mismatch, or the host could not apply the payment
    BusinessRule,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Authentication => write!(f, "authentication"),
            Self::Transport => write!(f, "transport"),
            Self::BusinessRule => write!(f, "business rule"),
        }
    }
}

/// Working record of one inbound notification
#[derive(Debug, Clone)]
pub struct CallbackState {
    pub request_key: Option<String>,
    pub transaction_id: Option<String>,
    pub signature: String,
    pub input_raw: String,
    pub input_filtered: CallbackInput,
    /// Decoded body as received, an empty object when it was not one
    pub post: Map<String, Value>,
    pub ip: Option<String>,
    pub purchase_request: Option<PurchaseRequest>,
    pub payment_profile: Option<PaymentProfile>,
    /// Decoded answer of the order detail call
    pub order_detail: Option<Value>,
    pub payment_result: PaymentResult,
    pub failure: Option<CallbackFailure>,
    pub log_type: Option<LogType>,
    pub log_message: Option<String>,
    pub log_details: Value,
    pub http_code: Option<StatusCode>,
}

impl CallbackState {
    /// Decode a raw notification body; never fails
    pub fn setup(raw: &[u8], ip: Option<String>) -> Self {
        let input_raw = String::from_utf8_lossy(raw).into_owned();
        let post = match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let input_filtered = CallbackInput::from_json(&post);

        let request_key = input_filtered
            .order
            .get("mrc_order_id")
            .and_then(json_string)
            .filter(|key| !key.is_empty());
        let transaction_id = input_filtered
            .order
            .get("txn_id")
            .and_then(json_string)
            .filter(|id| !id.is_empty());

        Self {
            request_key,
            transaction_id,
            signature: input_filtered.sign.clone(),
            input_raw,
            input_filtered,
            post,
            ip,
            purchase_request: None,
            payment_profile: None,
            order_detail: None,
            payment_result: PaymentResult::Unknown,
            failure: None,
            log_type: None,
            log_message: None,
            log_details: Value::Null,
            http_code: None,
        }
    }

    fn fail(
        &mut self,
        failure: CallbackFailure,
        message: impl Into<String>,
        http_code: Option<StatusCode>,
    ) -> CallbackFailure {
        self.failure = Some(failure);
        self.log_type = Some(LogType::Error);
        self.log_message = Some(message.into());
        if http_code.is_some() {
            self.http_code = http_code;
        }
        failure
    }

    pub fn is_received(&self) -> bool {
        self.payment_result == PaymentResult::Received
    }

    /// What to answer the gateway with
    pub fn response(&self) -> CallbackResponse {
        let body = self.log_message.clone().unwrap_or_default();
        let status = match (self.failure, self.http_code) {
            (_, Some(code)) => code,
            (Some(_), None) => DEFAULT_FAILURE_STATUS,
            (None, None) => StatusCode::OK,
        };
        CallbackResponse { status, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResponse {
    pub status: StatusCode,
    pub body: String,
}

/// HMAC-SHA256 signature of a notification payload, hex encoded
///
/// Keys are sorted at every level before the payload is serialized.
pub fn sign_payload(
    secret: &str,
    order: &Map<String, Value>,
    txn: &Map<String, Value>,
) -> AppResult<String> {
    let payload = CallbackInput {
        order: order.clone(),
        txn: txn.clone(),
        sign: String::new(),
    }
    .signed_payload();
    compute_signature(secret, &payload)
}

fn signing_error(message: impl fmt::Display) -> AppError {
    InfrastructureError::Token {
        message: message.to_string(),
    }
    .into()
}

fn compute_signature(secret: &str, payload: &Value) -> AppResult<String> {
    let canonical = serde_json::to_string(&sorted(payload)).map_err(signing_error)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(signing_error)?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn signatures_match(computed: &str, provided: &str) -> bool {
    let provided = provided.trim().to_ascii_lowercase();
    if computed.len() != provided.len() {
        return false;
    }
    computed
        .as_bytes()
        .iter()
        .zip(provided.as_bytes().iter())
        .fold(0, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Overlay `source` onto `target`, descending into objects present in both
fn merge_recursive(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_recursive(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Amounts arrive as numbers or numeric strings
fn json_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn round_cost(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Validates notifications and applies the payments they confirm
pub struct CallbackValidator {
    gateway: Arc<dyn PaymentGateway>,
    requests: Arc<dyn PurchaseRequestStore>,
    profiles: Arc<dyn PaymentProfileStore>,
    logs: Arc<dyn ProviderLogSink>,
    completer: Arc<dyn PurchaseCompleter>,
    clock: Arc<dyn Clock>,
    protocol: ProtocolProfile,
}

impl CallbackValidator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        requests: Arc<dyn PurchaseRequestStore>,
        profiles: Arc<dyn PaymentProfileStore>,
        logs: Arc<dyn ProviderLogSink>,
        completer: Arc<dyn PurchaseCompleter>,
        clock: Arc<dyn Clock>,
        protocol: ProtocolProfile,
    ) -> Self {
        Self {
            gateway,
            requests,
            profiles,
            logs,
            completer,
            clock,
            protocol,
        }
    }

    /// Process one notification end to end
    pub async fn handle(&self, raw: &[u8], ip: Option<String>) -> CallbackState {
        let mut state = CallbackState::setup(raw, ip);

        if self.validate(&mut state).await.is_ok() {
            self.complete_transaction(&mut state).await;
        }
        self.prepare_log_data(&mut state);
        self.log(&state).await;

        let response = state.response();
        match state.failure {
            Some(failure) => warn!(
                request_key = state.request_key.as_deref().unwrap_or("-"),
                status = response.status.as_u16(),
                "BaoKim callback rejected ({}): {}",
                failure,
                state.log_message.as_deref().unwrap_or_default()
            ),
            None => info!(
                request_key = state.request_key.as_deref().unwrap_or("-"),
                received = state.is_received(),
                "BaoKim callback processed"
            ),
        }
        state
    }

    /// Run every check, stopping at the first failure
    pub async fn validate(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        self.resolve(state).await?;
        self.authenticate(state).await?;
        self.validate_cost(state)?;
        self.derive_result(state);
        Ok(())
    }

    async fn resolve(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        let Some(request_key) = state.request_key.clone() else {
            // Without a key a retry can never succeed
            return Err(state.fail(
                CallbackFailure::Structural,
                MSG_UNEXPECTED_VALUES,
                Some(StatusCode::OK),
            ));
        };

        match self.lookup(&request_key).await {
            Ok(Some((request, profile))) => {
                state.purchase_request = Some(request);
                state.payment_profile = Some(profile);
                Ok(())
            }
            Ok(None) => Err(state.fail(CallbackFailure::Structural, MSG_UNEXPECTED_VALUES, None)),
            Err(e) => {
                error!("Could not load purchase request {}: {}", request_key, e);
                Err(state.fail(CallbackFailure::Structural, MSG_UNEXPECTED_VALUES, None))
            }
        }
    }

    async fn lookup(&self, request_key: &str) -> AppResult<Option<(PurchaseRequest, PaymentProfile)>> {
        let Some(request) = self.requests.find_request(request_key).await? else {
            return Ok(None);
        };
        let profile = self.profiles.find_profile(&request.payment_profile_id).await?;
        Ok(profile.map(|profile| (request, profile)))
    }

    async fn authenticate(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        match self.protocol.auth {
            AuthStrategy::Signature => self.verify_signature(state),
            AuthStrategy::Refetch => self.reconcile(state).await,
        }
    }

    fn verify_signature(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        let Some(profile) = state.payment_profile.as_ref() else {
            return Err(state.fail(CallbackFailure::Structural, MSG_UNEXPECTED_VALUES, None));
        };

        let verified = !state.signature.trim().is_empty()
            && compute_signature(&profile.api_secret, &state.input_filtered.signed_payload())
                .map(|computed| signatures_match(&computed, &state.signature))
                .unwrap_or(false);

        if verified {
            Ok(())
        } else {
            Err(state.fail(
                CallbackFailure::Authentication,
                MSG_NOT_VERIFIED,
                Some(StatusCode::BAD_REQUEST),
            ))
        }
    }

    /// Replace the notification's order with the gateway's own copy
    async fn reconcile(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        let (Some(profile), Some(request_key)) =
            (state.payment_profile.clone(), state.request_key.clone())
        else {
            return Err(state.fail(CallbackFailure::Structural, MSG_UNEXPECTED_VALUES, None));
        };

        let order = &state.input_filtered.order;
        let order_id = order
            .get("id")
            .or_else(|| order.get("order_id"))
            .and_then(json_string)
            .unwrap_or_default();

        let response = match self
            .gateway
            .fetch_order_detail(&profile, &order_id, &request_key)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                return Err(state.fail(
                    CallbackFailure::Transport,
                    message,
                    Some(StatusCode::BAD_REQUEST),
                ));
            }
        };

        let detail = response.json_object();
        state.order_detail = detail.clone();

        let Some(data) = detail
            .as_ref()
            .and_then(|detail| detail.get("data"))
            .and_then(Value::as_object)
        else {
            let err = ExternalError::InvalidResponse {
                provider: PROVIDER_TITLE.to_string(),
                message: "order detail carries no data object".to_string(),
            };
            return Err(state.fail(
                CallbackFailure::Transport,
                err.to_string(),
                Some(StatusCode::BAD_REQUEST),
            ));
        };

        let confirmed = data.get("mrc_order_id").and_then(json_string);
        if confirmed.as_deref() != Some(request_key.as_str()) {
            return Err(state.fail(
                CallbackFailure::Authentication,
                MSG_ORDER_MISMATCH,
                Some(StatusCode::BAD_REQUEST),
            ));
        }

        merge_recursive(&mut state.input_filtered.order, data);
        Ok(())
    }

    fn validate_cost(&self, state: &mut CallbackState) -> Result<(), CallbackFailure> {
        let Some(expected) = state.purchase_request.as_ref().map(|r| round_cost(r.cost_amount))
        else {
            return Err(state.fail(CallbackFailure::Structural, MSG_UNEXPECTED_VALUES, None));
        };

        let input = &state.input_filtered;
        let paid = match self.protocol.cost_rule {
            CostRule::TransactionTotal => input.txn.get("total_amount").and_then(json_decimal),
            CostRule::OrderTotalLessTax => {
                let tax = input
                    .order
                    .get("tax_fee")
                    .and_then(json_decimal)
                    .unwrap_or_default();
                input
                    .order
                    .get("total_amount")
                    .and_then(json_decimal)
                    .and_then(|total| total.checked_sub(tax))
            }
        };

        match paid.map(round_cost) {
            Some(paid) if paid == expected => Ok(()),
            _ => Err(state.fail(CallbackFailure::BusinessRule, MSG_INVALID_COST, None)),
        }
    }

    fn derive_result(&self, state: &mut CallbackState) {
        let stat = state.input_filtered.order.get("stat").and_then(json_string);
        if stat.as_deref() == Some(STAT_COMPLETED) {
            state.payment_result = PaymentResult::Received;
        }
    }

    async fn complete_transaction(&self, state: &mut CallbackState) {
        if !state.is_received() {
            state.log_type = Some(LogType::Info);
            state.log_message = Some(MSG_NO_ACTION.to_string());
            return;
        }

        let Some(request) = state.purchase_request.clone() else {
            return;
        };
        let transaction_id = state.transaction_id.clone().unwrap_or_default();

        if let Err(e) = self.completer.complete(&request, &transaction_id).await {
            error!(
                "Could not complete purchase {} for transaction {}: {}",
                request.request_key, transaction_id, e
            );
            state.fail(
                CallbackFailure::BusinessRule,
                e.to_string(),
                Some(StatusCode::INTERNAL_SERVER_ERROR),
            );
            return;
        }

        state.log_type = Some(LogType::Payment);
        state.log_message = Some(success_message());
    }

    fn prepare_log_data(&self, state: &mut CallbackState) {
        let mut details = state.post.clone();
        details.insert("raw".to_string(), Value::String(state.input_raw.clone()));
        details.insert(
            "orderDetail".to_string(),
            state.order_detail.clone().unwrap_or(Value::Null),
        );
        if let Some(ip) = &state.ip {
            details.insert("ip".to_string(), Value::String(ip.clone()));
        }
        state.log_details = Value::Object(details);
    }

    async fn log(&self, state: &CallbackState) {
        let entry = ProviderLogEntry {
            id: Uuid::new_v4(),
            request_key: state.request_key.clone().unwrap_or_default(),
            provider_id: PROVIDER_ID.to_string(),
            transaction_id: state.transaction_id.clone().unwrap_or_default(),
            log_type: state.log_type.unwrap_or(LogType::Info),
            message: state.log_message.clone().unwrap_or_default(),
            details: state.log_details.clone(),
            created_at: self.clock.now(),
        };

        if let Err(e) = self.logs.record(entry).await {
            error!("Could not write provider log for BaoKim callback: {}", e);
        }
    }
}
