//! Scripted gateway shared by the unit tests

use crate::error::{AppResult, ExternalError};
use crate::payments::traits::PaymentGateway;
use crate::payments::types::{BankChannel, GatewayResponse, OrderCreationParams, PaymentProfile};
use async_trait::async_trait;
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct FakeGateway {
    channels: Vec<BankChannel>,
    order_response: Option<AppResult<GatewayResponse>>,
    detail_response: Option<AppResult<GatewayResponse>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    last_params: Mutex<Option<OrderCreationParams>>,
    last_detail_query: Mutex<Option<(String, String)>>,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self {
            channels: Vec::new(),
            order_response: None,
            detail_response: None,
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
            last_detail_query: Mutex::new(None),
        }
    }

    pub(crate) fn with_channels(mut self, channels: Vec<BankChannel>) -> Self {
        self.channels = channels;
        self
    }

    pub(crate) fn with_order_response(mut self, response: AppResult<GatewayResponse>) -> Self {
        self.order_response = Some(response);
        self
    }

    pub(crate) fn with_detail_response(mut self, response: AppResult<GatewayResponse>) -> Self {
        self.detail_response = Some(response);
        self
    }

    pub(crate) fn with_detail_json(self, body: serde_json::Value) -> Self {
        self.with_detail_response(Ok(GatewayResponse::new(StatusCode::OK, body.to_string())))
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_params(&self) -> Option<OrderCreationParams> {
        self.last_params.lock().unwrap().clone()
    }

    pub(crate) fn last_detail_query(&self) -> Option<(String, String)> {
        self.last_detail_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn list_channels(&self, _profile: &PaymentProfile) -> Vec<BankChannel> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.channels.clone()
    }

    async fn create_order(
        &self,
        _profile: &PaymentProfile,
        params: &OrderCreationParams,
    ) -> AppResult<GatewayResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
        self.order_response
            .clone()
            .unwrap_or_else(|| Ok(GatewayResponse::new(StatusCode::OK, "{}")))
    }

    async fn fetch_order_detail(
        &self,
        _profile: &PaymentProfile,
        order_id: &str,
        merchant_order_id: &str,
    ) -> AppResult<GatewayResponse> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_detail_query.lock().unwrap() =
            Some((order_id.to_string(), merchant_order_id.to_string()));
        self.detail_response.clone().unwrap_or_else(|| {
            Err(ExternalError::UnexpectedStatus {
                provider: "BaoKim".to_string(),
                status: 404,
                reason: "Not Found".to_string(),
            }
            .into())
        })
    }

    fn endpoint(&self) -> &str {
        "https://sandbox-api.baokim.vn"
    }
}
