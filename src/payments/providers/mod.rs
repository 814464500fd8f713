//! Payment provider implementations
//!
//! Concrete implementations of the PaymentGateway trait.

pub mod baokim;

pub use baokim::{BaoKimClient, BaoKimConfig};
