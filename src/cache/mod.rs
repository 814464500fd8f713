//! In-process caching layer
//!
//! The gateway's bank list is the only shared mutable state of the
//! integration. It is owned by a [`BankListCache`] created at startup and
//! cleared on shutdown.

pub mod bank_list;
pub mod cache;
pub mod keys;

pub use bank_list::BankListCache;
pub use cache::{Cache, CacheEntry, MemoryCache};

/// Cache lifetimes
pub mod ttl {
    /// Bank list: one day
    pub const BANK_LIST_SECS: i64 = 86_400;
}
