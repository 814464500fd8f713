//! BaoKim protocol variants
//!
//! BaoKim exposes two flavours of its v4 API. They share one callback state
//! machine; everything that differs is captured by [`ProtocolProfile`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an inbound notification is proven to come from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    /// HMAC-SHA256 over the notification body, keyed by the profile secret
    Signature,
    /// Re-read the order from the gateway and trust only that copy
    Refetch,
}

impl FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signature" => Ok(Self::Signature),
            "refetch" => Ok(Self::Refetch),
            other => Err(format!(
                "auth strategy must be 'signature' or 'refetch', got {}",
                other
            )),
        }
    }
}

/// Which amount of the reconciled notification must match the expected cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostRule {
    /// `txn.total_amount`
    TransactionTotal,
    /// `order.total_amount - order.tax_fee`
    OrderTotalLessTax,
}

/// Shape of the payment link returned by order creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectStyle {
    /// `data.payment_url`, already absolute
    AbsolutePaymentUrl,
    /// `data.redirect_url`, relative to the API endpoint
    RelativeRedirectUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Routes under `/payment/api/v4`
    Payment,
    /// Routes under `/api/v4`
    Api,
}

impl ProtocolVariant {
    pub fn profile(self) -> ProtocolProfile {
        match self {
            Self::Payment => ProtocolProfile {
                variant: self,
                api_prefix: "/payment/api/v4",
                auth: AuthStrategy::Refetch,
                detail_requires_token: true,
                cost_rule: CostRule::TransactionTotal,
                redirect: RedirectStyle::AbsolutePaymentUrl,
                wallet_channel: true,
                surface_gateway_errors: true,
            },
            Self::Api => ProtocolProfile {
                variant: self,
                api_prefix: "/api/v4",
                auth: AuthStrategy::Signature,
                detail_requires_token: false,
                cost_rule: CostRule::OrderTotalLessTax,
                redirect: RedirectStyle::RelativeRedirectUrl,
                wallet_channel: false,
                surface_gateway_errors: false,
            },
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payment => write!(f, "payment"),
            Self::Api => write!(f, "api"),
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payment" => Ok(Self::Payment),
            "api" => Ok(Self::Api),
            other => Err(format!("protocol must be 'payment' or 'api', got {}", other)),
        }
    }
}

/// Everything that differs between the two protocol variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtocolProfile {
    pub variant: ProtocolVariant,
    /// Prefix of the order send/detail routes
    pub api_prefix: &'static str,
    pub auth: AuthStrategy,
    /// The detail endpoint wants a fresh `jwt` query credential
    pub detail_requires_token: bool,
    pub cost_rule: CostRule,
    pub redirect: RedirectStyle,
    /// `type=momo` selects the mobile wallet pseudo-channel
    pub wallet_channel: bool,
    /// Gateway error messages may be shown to the payer verbatim
    pub surface_gateway_errors: bool,
}

impl ProtocolProfile {
    /// Bank list lives under the payment prefix for both variants
    pub const BANK_LIST_PATH: &'static str = "/payment/api/v4/bpm/list";

    pub fn with_auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = auth;
        self
    }

    pub fn order_send_path(&self) -> String {
        format!("{}/order/send", self.api_prefix)
    }

    pub fn order_detail_path(&self) -> String {
        format!("{}/order/detail", self.api_prefix)
    }
}

impl Default for ProtocolProfile {
    fn default() -> Self {
        ProtocolVariant::Payment.profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_paths() {
        let payment = ProtocolVariant::Payment.profile();
        assert_eq!(payment.order_send_path(), "/payment/api/v4/order/send");
        assert_eq!(payment.order_detail_path(), "/payment/api/v4/order/detail");

        let api = ProtocolVariant::Api.profile();
        assert_eq!(api.order_send_path(), "/api/v4/order/send");
        assert_eq!(api.order_detail_path(), "/api/v4/order/detail");
    }

    #[test]
    fn test_parse_variant_and_strategy() {
        assert_eq!("Payment".parse::<ProtocolVariant>(), Ok(ProtocolVariant::Payment));
        assert_eq!(" api ".parse::<ProtocolVariant>(), Ok(ProtocolVariant::Api));
        assert!("v3".parse::<ProtocolVariant>().is_err());

        assert_eq!("SIGNATURE".parse::<AuthStrategy>(), Ok(AuthStrategy::Signature));
        assert!("none".parse::<AuthStrategy>().is_err());
    }

    #[test]
    fn test_auth_override_keeps_other_toggles() {
        let profile = ProtocolVariant::Api.profile().with_auth(AuthStrategy::Refetch);
        assert_eq!(profile.auth, AuthStrategy::Refetch);
        assert_eq!(profile.cost_rule, CostRule::OrderTotalLessTax);
        assert!(!profile.detail_requires_token);
    }
}
