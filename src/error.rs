//! Application error types
//!
//! Every fallible operation in the crate returns [`AppResult`]. Errors carry a
//! kind describing which layer failed; only [`PaymentError`] variants are ever
//! shown to a payer, everything else is mapped to a generic message first.

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Failures talking to the payment gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{provider} request failed: {message}")]
    PaymentProvider { provider: String, message: String },

    #[error("{provider} request timed out after {seconds} seconds")]
    Timeout { provider: String, seconds: u64 },

    #[error("{provider} returned HTTP {status}: {reason}")]
    UnexpectedStatus {
        provider: String,
        status: u16,
        reason: String,
    },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Errors a payer may see while starting a payment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Please choose a valid bank.")]
    InvalidBankSelection,

    #[error("An error occurred while creating the order. Please try again later.")]
    OrderCreationFailed,

    /// Message reported by the gateway alongside a non-zero error code.
    #[error("{0}")]
    GatewayMessage(String),

    #[error("The purchase request must belong to a specific user.")]
    MissingPayer,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Could not sign gateway token: {message}")]
    Token { message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppErrorKind {
    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}")]
pub struct AppError {
    pub kind: AppErrorKind,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self { kind }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        InfrastructureError::Configuration {
            message: message.into(),
        }
        .into()
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.kind, AppErrorKind::External(_))
    }

    /// Text that is safe to show to the payer.
    ///
    /// Gateway and infrastructure details never leave the process; they are
    /// collapsed into the generic order creation message.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Payment(err) => err.to_string(),
            _ => PaymentError::OrderCreationFailed.to_string(),
        }
    }
}

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        Self::new(AppErrorKind::External(err))
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        Self::new(AppErrorKind::Payment(err))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(err: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(err))
    }
}
