//! Order initiation
//!
//! Builds the order for a purchase request, resolves the payer's channel and
//! turns the gateway's answer into a redirect or a payer-safe error.

use crate::cache::BankListCache;
use crate::error::{AppResult, ExternalError, PaymentError};
use crate::payments::protocol::{ProtocolProfile, RedirectStyle};
use crate::payments::providers::baokim::{PROVIDER_ID, PROVIDER_TITLE};
use crate::payments::traits::{Clock, PaymentGateway, ProviderLogSink};
use crate::payments::types::{
    json_string, json_u64, BankChannel, ChannelSelection, GatewayResponse, InitiateView, LogType,
    OrderCreationParams, PaymentProfile, ProviderLogEntry, Purchase, PurchaseRequest,
    RedirectTarget,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pseudo-channel paying by QR code
pub const BANK_ID_QRCODE: u64 = 297;
/// Pseudo-channel paying by MoMo wallet
pub const BANK_ID_MOMO: u64 = 299;

pub struct Checkout {
    gateway: Arc<dyn PaymentGateway>,
    banks: Arc<BankListCache>,
    logs: Arc<dyn ProviderLogSink>,
    clock: Arc<dyn Clock>,
    protocol: ProtocolProfile,
    webhook_url: String,
}

impl Checkout {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        banks: Arc<BankListCache>,
        logs: Arc<dyn ProviderLogSink>,
        clock: Arc<dyn Clock>,
        protocol: ProtocolProfile,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            banks,
            logs,
            clock,
            protocol,
            webhook_url: webhook_url.into(),
        }
    }

    /// Order parameters for `request`, without a channel selected
    pub fn payment_params(
        &self,
        request: &PurchaseRequest,
        purchase: &Purchase,
    ) -> AppResult<OrderCreationParams> {
        let user = request.user.as_ref().ok_or(PaymentError::MissingPayer)?;

        Ok(OrderCreationParams {
            mrc_order_id: request.request_key.clone(),
            total_amount: purchase.cost,
            description: purchase.description.clone(),
            url_success: purchase.return_url.clone(),
            url_detail: purchase.cancel_url.clone(),
            accept_bank: 1,
            accept_cc: 1,
            accept_qrpay: 1,
            webhooks: self.webhook_url.clone(),
            customer_email: user.email.clone(),
            customer_name: user.username.clone(),
            customer_phone: purchase.extra_data.get("phone_number").cloned(),
            customer_address: purchase.extra_data.get("customer_address").cloned(),
            lang: "vi".to_string(),
            bpm_id: None,
        })
    }

    /// Everything the bank selection page needs; does not create an order
    pub async fn initiate(
        &self,
        request: &PurchaseRequest,
        profile: &PaymentProfile,
        purchase: &Purchase,
    ) -> AppResult<InitiateView> {
        let params = self.payment_params(request, purchase)?;
        let bank_list = self.banks.bank_transfer_channels(profile).await;

        Ok(InitiateView {
            request_key: request.request_key.clone(),
            amount: purchase.cost,
            currency: request.cost_currency.clone(),
            description: purchase.description.clone(),
            params,
            bank_list,
        })
    }

    /// Channel id for the payer's selection
    ///
    /// Pseudo-channels bypass the bank list; an explicit bank must match
    /// exactly one bank-transfer channel.
    pub async fn resolve_channel(
        &self,
        selection: &ChannelSelection,
        profile: &PaymentProfile,
    ) -> AppResult<u64> {
        match selection.kind.as_deref() {
            Some("qrcode") => return Ok(BANK_ID_QRCODE),
            Some("momo") if self.protocol.wallet_channel => return Ok(BANK_ID_MOMO),
            _ => {}
        }

        let bank_id = selection.bank_id.ok_or(PaymentError::InvalidBankSelection)?;
        let banks = self.banks.bank_transfer_channels(profile).await;
        let matches: Vec<&BankChannel> = banks.iter().filter(|bank| bank.id == bank_id).collect();

        if matches.len() != 1 {
            warn!(
                "Rejected bank selection {}: {} matching channels",
                bank_id,
                matches.len()
            );
            return Err(PaymentError::InvalidBankSelection.into());
        }
        Ok(bank_id)
    }

    /// Create the order and return where to send the payer
    pub async fn submit(
        &self,
        selection: &ChannelSelection,
        request: &PurchaseRequest,
        profile: &PaymentProfile,
        purchase: &Purchase,
    ) -> AppResult<RedirectTarget> {
        let mut params = self.payment_params(request, purchase)?;
        params.bpm_id = Some(self.resolve_channel(selection, profile).await?);

        let response = match self.gateway.create_order(profile, &params).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "BaoKim order creation failed for {}: {}",
                    request.request_key, e
                );
                self.audit(
                    request,
                    String::new(),
                    LogType::Error,
                    "Creating a order failed",
                    json!({
                        "requestData": params,
                        "error": e.to_string(),
                    }),
                )
                .await;
                return Err(PaymentError::OrderCreationFailed.into());
            }
        };

        let body = response.json_object();
        let order_id = body
            .as_ref()
            .and_then(|json| json.pointer("/data/order_id"))
            .and_then(json_string)
            .unwrap_or_default();

        self.audit(
            request,
            order_id,
            LogType::Info,
            "Creating a order",
            order_log_details(&response, body.as_ref(), &params),
        )
        .await;

        let Some(body) = body else {
            let err = ExternalError::InvalidResponse {
                provider: PROVIDER_TITLE.to_string(),
                message: format!("HTTP {}: {}", response.status.as_u16(), response.body),
            };
            error!("{}", err);
            return Err(PaymentError::OrderCreationFailed.into());
        };

        if let Some(url) = self.redirect_url(&body) {
            info!("Redirecting {} to BaoKim", request.request_key);
            return Ok(RedirectTarget { url });
        }

        if self.protocol.surface_gateway_errors {
            let code = body.get("code").and_then(json_u64).unwrap_or_default();
            if code > 0 {
                if let Some(message) = body.get("message").and_then(first_message) {
                    warn!(
                        "BaoKim rejected order {} with code {}",
                        request.request_key, code
                    );
                    return Err(PaymentError::GatewayMessage(message).into());
                }
            }
        }

        Err(PaymentError::OrderCreationFailed.into())
    }

    fn redirect_url(&self, body: &Value) -> Option<String> {
        let url = |pointer: &str| {
            body.pointer(pointer)
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        };

        match self.protocol.redirect {
            RedirectStyle::AbsolutePaymentUrl => url("/data/payment_url"),
            RedirectStyle::RelativeRedirectUrl => url("/data/redirect_url")
                .or_else(|| url("/data/payment_url"))
                .map(|target| join_endpoint(self.gateway.endpoint(), &target)),
        }
    }

    async fn audit(
        &self,
        request: &PurchaseRequest,
        transaction_id: String,
        log_type: LogType,
        message: &str,
        details: Value,
    ) {
        let entry = ProviderLogEntry {
            id: Uuid::new_v4(),
            request_key: request.request_key.clone(),
            provider_id: PROVIDER_ID.to_string(),
            transaction_id,
            log_type,
            message: message.to_string(),
            details,
            created_at: self.clock.now(),
        };
        if let Err(e) = self.logs.record(entry).await {
            error!("Could not write provider log for {}: {}", request.request_key, e);
        }
    }
}

fn order_log_details(
    response: &GatewayResponse,
    body: Option<&Value>,
    params: &OrderCreationParams,
) -> Value {
    json!({
        "responseData": body,
        "responseCode": response.status.as_u16(),
        "requestData": params,
        "_rawData": response.body,
    })
}

/// First human readable message of a gateway error payload
fn first_message(message: &Value) -> Option<String> {
    match message {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        Value::Object(fields) => fields.values().find_map(first_message),
        _ => None,
    }
}

fn join_endpoint(endpoint: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::bank_list::tests::{channel, ManualClock};
    use crate::error::AppErrorKind;
    use crate::payments::fake::FakeGateway;
    use crate::payments::protocol::ProtocolVariant;
    use crate::payments::types::User;
    use crate::store::MemoryProviderLog;
    use http::StatusCode;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct Fixture {
        gateway: Arc<FakeGateway>,
        logs: Arc<MemoryProviderLog>,
        checkout: Checkout,
    }

    fn fixture(gateway: FakeGateway, variant: ProtocolVariant) -> Fixture {
        let gateway = Arc::new(gateway);
        let clock = Arc::new(ManualClock::new());
        let logs = Arc::new(MemoryProviderLog::new());
        let banks = Arc::new(BankListCache::new(gateway.clone(), clock.clone()));
        let checkout = Checkout::new(
            gateway.clone(),
            banks,
            logs.clone(),
            clock,
            variant.profile(),
            "https://shop.test/payment/callback/baokim",
        );
        Fixture {
            gateway,
            logs,
            checkout,
        }
    }

    fn request() -> PurchaseRequest {
        PurchaseRequest {
            request_key: "ORD-123".to_string(),
            cost_amount: dec!(50000.00),
            cost_currency: "VND".to_string(),
            user: Some(User {
                user_id: 7,
                username: "payer".to_string(),
                email: "payer@shop.test".to_string(),
            }),
            payment_profile_id: "1".to_string(),
        }
    }

    fn purchase() -> Purchase {
        let mut extra_data = HashMap::new();
        extra_data.insert("phone_number".to_string(), "0900000000".to_string());
        Purchase {
            cost: dec!(50000.00),
            description: "Premium upgrade".to_string(),
            return_url: "https://shop.test/return".to_string(),
            cancel_url: "https://shop.test/cancel".to_string(),
            extra_data,
        }
    }

    fn profile() -> PaymentProfile {
        PaymentProfile {
            profile_id: "1".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        }
    }

    fn select_bank(bank_id: u64) -> ChannelSelection {
        ChannelSelection {
            kind: None,
            bank_id: Some(bank_id),
        }
    }

    fn select_kind(kind: &str) -> ChannelSelection {
        ChannelSelection {
            kind: Some(kind.to_string()),
            bank_id: None,
        }
    }

    fn ok_body(body: Value) -> AppResult<GatewayResponse> {
        Ok(GatewayResponse::new(StatusCode::OK, body.to_string()))
    }

    #[test]
    fn test_payment_params() {
        let fx = fixture(FakeGateway::new(), ProtocolVariant::Payment);
        let params = fx.checkout.payment_params(&request(), &purchase()).unwrap();

        assert_eq!(params.mrc_order_id, "ORD-123");
        assert_eq!(params.total_amount, dec!(50000.00));
        assert_eq!(params.customer_phone.as_deref(), Some("0900000000"));
        assert_eq!(params.customer_address, None);
        assert_eq!(params.webhooks, "https://shop.test/payment/callback/baokim");
        assert_eq!((params.accept_bank, params.accept_cc, params.accept_qrpay), (1, 1, 1));
    }

    #[test]
    fn test_payment_params_require_payer() {
        let fx = fixture(FakeGateway::new(), ProtocolVariant::Payment);
        let mut request = request();
        request.user = None;

        let err = fx.checkout.payment_params(&request, &purchase()).unwrap_err();
        assert_eq!(err.kind, AppErrorKind::Payment(PaymentError::MissingPayer));
    }

    #[tokio::test]
    async fn test_initiate_lists_bank_transfers_only() {
        let gateway =
            FakeGateway::new().with_channels(vec![channel(1, 1), channel(297, 16), channel(2, 1)]);
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let view = fx
            .checkout
            .initiate(&request(), &profile(), &purchase())
            .await
            .unwrap();

        assert_eq!(view.bank_list, vec![channel(1, 1), channel(2, 1)]);
        assert_eq!(fx.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_qrcode_skips_bank_list() {
        let gateway = FakeGateway::new().with_order_response(ok_body(json!({
            "data": {"order_id": 42, "payment_url": "https://pay.baokim.vn/42"}
        })));
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let target = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap();

        assert_eq!(target.url, "https://pay.baokim.vn/42");
        assert_eq!(fx.gateway.list_calls(), 0);
        assert_eq!(fx.gateway.last_params().unwrap().bpm_id, Some(BANK_ID_QRCODE));
    }

    #[tokio::test]
    async fn test_momo_depends_on_variant() {
        let fx = fixture(FakeGateway::new(), ProtocolVariant::Payment);
        let id = fx
            .checkout
            .resolve_channel(&select_kind("momo"), &profile())
            .await
            .unwrap();
        assert_eq!(id, BANK_ID_MOMO);

        let fx = fixture(FakeGateway::new(), ProtocolVariant::Api);
        let err = fx
            .checkout
            .resolve_channel(&select_kind("momo"), &profile())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AppErrorKind::Payment(PaymentError::InvalidBankSelection));
    }

    #[tokio::test]
    async fn test_unknown_bank_never_reaches_gateway() {
        let gateway = FakeGateway::new().with_channels(vec![channel(1, 1), channel(297, 16)]);
        let fx = fixture(gateway, ProtocolVariant::Payment);

        for selection in [select_bank(5), select_bank(297), ChannelSelection::default()] {
            let err = fx
                .checkout
                .submit(&selection, &request(), &profile(), &purchase())
                .await
                .unwrap_err();
            assert_eq!(err.user_message(), "Please choose a valid bank.");
        }

        assert_eq!(fx.gateway.create_calls(), 0);
        assert!(fx.logs.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_bank_entries_are_rejected() {
        let gateway = FakeGateway::new().with_channels(vec![channel(1, 1), channel(1, 1)]);
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let err = fx
            .checkout
            .resolve_channel(&select_bank(1), &profile())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AppErrorKind::Payment(PaymentError::InvalidBankSelection));
    }

    #[tokio::test]
    async fn test_explicit_bank_is_audited_and_redirected() {
        let gateway = FakeGateway::new()
            .with_channels(vec![channel(151, 1)])
            .with_order_response(ok_body(json!({
                "code": 0,
                "data": {"order_id": "42", "payment_url": "https://pay.baokim.vn/42"}
            })));
        let fx = fixture(gateway, ProtocolVariant::Payment);

        fx.checkout
            .submit(&select_bank(151), &request(), &profile(), &purchase())
            .await
            .unwrap();

        let entries = fx.logs.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_id, "42");
        assert_eq!(entries[0].log_type, LogType::Info);
        assert_eq!(entries[0].details["responseCode"], 200);
        assert_eq!(entries[0].details["requestData"]["bpm_id"], 151);
        assert!(entries[0].details["_rawData"].as_str().unwrap().contains("payment_url"));
    }

    #[tokio::test]
    async fn test_relative_redirect_is_joined_to_endpoint() {
        let gateway = FakeGateway::new().with_order_response(ok_body(json!({
            "data": {"order_id": 42, "redirect_url": "/payment/checkout/42"}
        })));
        let fx = fixture(gateway, ProtocolVariant::Api);

        let target = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap();
        assert_eq!(target.url, "https://sandbox-api.baokim.vn/payment/checkout/42");
    }

    #[tokio::test]
    async fn test_gateway_error_message_is_surfaced() {
        let gateway = FakeGateway::new().with_order_response(ok_body(json!({
            "code": 7,
            "message": ["Số tiền không hợp lệ", "second"]
        })));
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let err = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Số tiền không hợp lệ");
    }

    #[tokio::test]
    async fn test_gateway_error_message_hidden_for_api_variant() {
        let gateway = FakeGateway::new().with_order_response(ok_body(json!({
            "code": 7,
            "message": ["Số tiền không hợp lệ"]
        })));
        let fx = fixture(gateway, ProtocolVariant::Api);

        let err = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AppErrorKind::Payment(PaymentError::OrderCreationFailed));
    }

    #[tokio::test]
    async fn test_unparsable_response_is_audited_then_generic_error() {
        let gateway = FakeGateway::new().with_order_response(Ok(GatewayResponse::new(
            StatusCode::BAD_GATEWAY,
            "<html>oops</html>",
        )));
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let err = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap_err();
        assert_eq!(err.kind, AppErrorKind::Payment(PaymentError::OrderCreationFailed));

        let entries = fx.logs.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["responseData"], Value::Null);
        assert_eq!(entries[0].details["_rawData"], "<html>oops</html>");
    }

    #[tokio::test]
    async fn test_transport_failure_is_audited_then_generic_error() {
        let gateway = FakeGateway::new().with_order_response(Err(ExternalError::Timeout {
            provider: "BaoKim".to_string(),
            seconds: 30,
        }
        .into()));
        let fx = fixture(gateway, ProtocolVariant::Payment);

        let err = fx
            .checkout
            .submit(&select_kind("qrcode"), &request(), &profile(), &purchase())
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "An error occurred while creating the order. Please try again later."
        );

        let entries = fx.logs.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log_type, LogType::Error);
        assert_eq!(entries[0].details["requestData"]["mrc_order_id"], "ORD-123");
    }

    #[test]
    fn test_join_endpoint() {
        assert_eq!(join_endpoint("https://a.test/", "/x/y"), "https://a.test/x/y");
        assert_eq!(join_endpoint("https://a.test", "x"), "https://a.test/x");
        assert_eq!(join_endpoint("https://a.test", "https://b.test/z"), "https://b.test/z");
    }
}
