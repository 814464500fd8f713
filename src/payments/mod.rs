//! Payment provider integration module
//!
//! BaoKim order creation, bank selection and payment notifications. The
//! gateway and every host collaborator sit behind the traits in [`traits`].

pub mod callback;
pub mod checkout;
pub mod protocol;
pub mod providers;
pub mod token;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use callback::{CallbackResponse, CallbackState, CallbackValidator};
pub use checkout::Checkout;
pub use protocol::{AuthStrategy, ProtocolProfile, ProtocolVariant};
pub use providers::{BaoKimClient, BaoKimConfig};
pub use traits::{
    Clock, PaymentGateway, PaymentProfileStore, ProviderLogSink, PurchaseCompleter,
    PurchaseRequestStore, SystemClock,
};
