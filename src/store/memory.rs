use crate::error::AppResult;
use crate::payments::traits::{
    PaymentProfileStore, ProviderLogSink, PurchaseCompleter, PurchaseRequestStore,
};
use crate::payments::types::{PaymentProfile, ProviderLogEntry, Purchase, PurchaseRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Purchase requests and payment profiles held in memory
#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<HashMap<String, (PurchaseRequest, Purchase)>>,
    profiles: RwLock<HashMap<String, PaymentProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_request(&self, request: PurchaseRequest, purchase: Purchase) {
        debug!("Storing purchase request {}", request.request_key);
        self.requests
            .write()
            .await
            .insert(request.request_key.clone(), (request, purchase));
    }

    pub async fn insert_profile(&self, profile: PaymentProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.profile_id.clone(), profile);
    }
}

#[async_trait]
impl PurchaseRequestStore for MemoryStore {
    async fn find_request(&self, request_key: &str) -> AppResult<Option<PurchaseRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .get(request_key)
            .map(|(request, _)| request.clone()))
    }

    async fn find_purchase(&self, request_key: &str) -> AppResult<Option<Purchase>> {
        Ok(self
            .requests
            .read()
            .await
            .get(request_key)
            .map(|(_, purchase)| purchase.clone()))
    }
}

#[async_trait]
impl PaymentProfileStore for MemoryStore {
    async fn find_profile(&self, profile_id: &str) -> AppResult<Option<PaymentProfile>> {
        Ok(self.profiles.read().await.get(profile_id).cloned())
    }
}

/// Provider log kept in memory, newest last
#[derive(Default)]
pub struct MemoryProviderLog {
    entries: RwLock<Vec<ProviderLogEntry>>,
}

impl MemoryProviderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ProviderLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ProviderLogSink for MemoryProviderLog {
    async fn record(&self, entry: ProviderLogEntry) -> AppResult<()> {
        debug!(
            "Provider log [{}] {}: {}",
            entry.log_type, entry.request_key, entry.message
        );
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Completes purchases by remembering which requests were paid
///
/// Repeated notifications for the same request and transaction are ignored.
#[derive(Default)]
pub struct RecordingCompleter {
    completed: RwLock<Vec<(String, String)>>,
}

impl RecordingCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(request_key, transaction_id)` pairs completed so far
    pub async fn completed(&self) -> Vec<(String, String)> {
        self.completed.read().await.clone()
    }
}

#[async_trait]
impl PurchaseCompleter for RecordingCompleter {
    async fn complete(&self, request: &PurchaseRequest, transaction_id: &str) -> AppResult<()> {
        let key = (request.request_key.clone(), transaction_id.to_string());
        let mut completed = self.completed.write().await;
        if completed.contains(&key) {
            debug!("Purchase {} already completed", request.request_key);
            return Ok(());
        }
        info!(
            "Purchase {} completed by transaction {}",
            request.request_key, transaction_id
        );
        completed.push(key);
        Ok(())
    }
}
