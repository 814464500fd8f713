//! HTTP surface
//!
//! Health check, the gateway webhook and the payer facing checkout routes.

pub mod callback;
pub mod checkout;
pub mod health;

use crate::cache::BankListCache;
use crate::config::{Config, CALLBACK_PATH};
use crate::error::AppError;
use crate::payments::traits::{Clock, PaymentGateway, ProviderLogSink, PurchaseCompleter};
use crate::payments::{CallbackValidator, Checkout};
use crate::store::MemoryStore;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MemoryStore>,
    pub banks: Arc<BankListCache>,
    pub checkout: Arc<Checkout>,
    pub callbacks: Arc<CallbackValidator>,
}

impl AppState {
    pub fn new(
        config: Config,
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<MemoryStore>,
        logs: Arc<dyn ProviderLogSink>,
        completer: Arc<dyn PurchaseCompleter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let protocol = config.gateway.protocol;
        let banks = Arc::new(BankListCache::new(gateway.clone(), clock.clone()));

        let checkout = Checkout::new(
            gateway.clone(),
            banks.clone(),
            logs.clone(),
            clock.clone(),
            protocol,
            config.webhook_url(),
        );
        let callbacks = CallbackValidator::new(
            gateway,
            store.clone(),
            store.clone(),
            logs,
            completer,
            clock,
            protocol,
        );

        Self {
            config: Arc::new(config),
            store,
            banks,
            checkout: Arc::new(checkout),
            callbacks: Arc::new(callbacks),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(CALLBACK_PATH, post(callback::baokim_callback))
        .route(
            "/payment/baokim/:request_key",
            get(checkout::initiate).post(checkout::submit),
        )
        .route("/purchase-requests", post(checkout::register_purchase))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// JSON error body `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.user_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
