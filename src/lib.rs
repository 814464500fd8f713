//! BaoKim payment gateway integration
//!
//! Order creation with bank selection, and validation of the gateway's
//! payment notifications against its own order records.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod payments;
pub mod store;
