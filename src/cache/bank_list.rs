//! Cached list of the gateway's payment channels

use super::cache::{Cache, MemoryCache};
use super::{keys, ttl};
use crate::payments::traits::{Clock, PaymentGateway};
use crate::payments::types::{BankChannel, PaymentProfile};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct BankListCache {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn Cache<Vec<BankChannel>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl BankListCache {
    pub fn new(gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(
            gateway,
            Arc::new(MemoryCache::<Vec<BankChannel>>::new()),
            clock,
            Duration::seconds(ttl::BANK_LIST_SECS),
        )
    }

    pub fn with_store(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn Cache<Vec<BankChannel>>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
            ttl,
        }
    }

    /// Every channel the gateway offers
    ///
    /// Refreshes once the cached copy is `ttl` old. A failed refresh keeps
    /// serving the stale copy, or nothing if there never was one.
    pub async fn get(&self, profile: &PaymentProfile) -> Vec<BankChannel> {
        let now = self.clock.now();
        let cached = self.store.get(keys::BANK_LIST).await;

        if let Some(entry) = &cached {
            if entry.stored_at + self.ttl > now {
                debug!("Serving {} cached payment channels", entry.value.len());
                return entry.value.clone();
            }
        }

        let fresh = self.gateway.list_channels(profile).await;
        if fresh.is_empty() {
            warn!("Bank list refresh returned nothing, keeping previous copy");
            return cached.map(|entry| entry.value).unwrap_or_default();
        }

        info!("Bank list refreshed with {} channels", fresh.len());
        self.store.set(keys::BANK_LIST, fresh.clone(), now).await;
        fresh
    }

    /// Channels eligible for explicit bank selection (`type == 1`)
    pub async fn bank_transfer_channels(&self, profile: &PaymentProfile) -> Vec<BankChannel> {
        self.get(profile)
            .await
            .into_iter()
            .filter(BankChannel::is_bank_transfer)
            .collect()
    }

    /// Forget the cached list, used on shutdown and by the host to force a refresh
    pub async fn invalidate(&self) {
        self.store.delete(keys::BANK_LIST).await;
    }
}
