//! Payment provider trait definitions
//!
//! The gateway itself and every host collaborator the integration talks to
//! sit behind one of these traits.

use crate::error::AppResult;
use crate::payments::types::{
    BankChannel, GatewayResponse, OrderCreationParams, PaymentProfile, ProviderLogEntry,
    Purchase, PurchaseRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outbound calls to the payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// List available payment channels
    ///
    /// Soft-fails: transport errors and non-200 answers yield an empty list.
    async fn list_channels(&self, profile: &PaymentProfile) -> Vec<BankChannel>;

    /// Submit an order
    ///
    /// Any HTTP answer is returned verbatim so the caller can audit it; only
    /// transport failures are errors.
    async fn create_order(
        &self,
        profile: &PaymentProfile,
        params: &OrderCreationParams,
    ) -> AppResult<GatewayResponse>;

    /// Fetch the gateway's own record of an order
    ///
    /// Anything but HTTP 200 is an error carrying the status and reason.
    async fn fetch_order_detail(
        &self,
        profile: &PaymentProfile,
        order_id: &str,
        merchant_order_id: &str,
    ) -> AppResult<GatewayResponse>;

    /// Base URL requests are sent to
    fn endpoint(&self) -> &str;
}

/// Host store of purchase requests, keyed by merchant order key
#[async_trait]
pub trait PurchaseRequestStore: Send + Sync {
    async fn find_request(&self, request_key: &str) -> AppResult<Option<PurchaseRequest>>;

    async fn find_purchase(&self, request_key: &str) -> AppResult<Option<Purchase>>;
}

/// Host store of gateway credentials
#[async_trait]
pub trait PaymentProfileStore: Send + Sync {
    async fn find_profile(&self, profile_id: &str) -> AppResult<Option<PaymentProfile>>;
}

/// Host audit log of provider traffic
#[async_trait]
pub trait ProviderLogSink: Send + Sync {
    async fn record(&self, entry: ProviderLogEntry) -> AppResult<()>;
}

/// Host hook run once a payment is confirmed
///
/// Implementations must tolerate being called again for the same request;
/// the gateway re-sends notifications it considers unacknowledged.
#[async_trait]
pub trait PurchaseCompleter: Send + Sync {
    async fn complete(&self, request: &PurchaseRequest, transaction_id: &str) -> AppResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
