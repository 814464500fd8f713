//! Short-lived JWTs for outbound gateway calls
//!
//! Each token embeds the exact form parameters it authorizes, so a captured
//! token cannot be replayed against a different payload.

use crate::error::{AppResult, InfrastructureError};
use crate::payments::traits::Clock;
use crate::payments::types::PaymentProfile;
use base64::Engine as _;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Validity window in seconds
pub const TOKEN_TTL_SECS: i64 = 60;

const TOKEN_ID_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub iat: i64,
    pub jti: String,
    pub iss: String,
    pub nbf: i64,
    pub exp: i64,
    pub form_params: serde_json::Value,
}

pub struct TokenIssuer {
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign a token authorizing `form_params` on behalf of `profile`
    pub fn issue<T>(&self, profile: &PaymentProfile, form_params: &T) -> AppResult<String>
    where
        T: Serialize + ?Sized,
    {
        let now = self.clock.now().timestamp();
        let form_params = serde_json::to_value(form_params).map_err(|e| {
            InfrastructureError::Token {
                message: format!("form params are not serializable: {}", e),
            }
        })?;

        let claims = TokenClaims {
            iat: now,
            jti: random_token_id(),
            iss: profile.api_key.clone(),
            nbf: now,
            exp: now + TOKEN_TTL_SECS,
            form_params,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(profile.api_secret.as_bytes()),
        )
        .map_err(|e| {
            InfrastructureError::Token {
                message: e.to_string(),
            }
            .into()
        })
    }
}

fn random_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use serde_json::json;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn profile() -> PaymentProfile {
        PaymentProfile {
            profile_id: "1".to_string(),
            api_key: "merchant-key".to_string(),
            api_secret: "merchant-secret".to_string(),
        }
    }

    fn decode_claims(token: &str, secret: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&["merchant-key"]);
        decode::<TokenClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
    }

    #[test]
    fn test_token_claims_bind_payload_and_window() {
        let issued = Utc::now();
        let issuer = TokenIssuer::new(Arc::new(FixedClock(issued)));
        let params = json!({"mrc_order_id": "ORD-123", "total_amount": "50000.00"});

        let token = issuer.issue(&profile(), &params).unwrap();
        let claims = decode_claims(&token, "merchant-secret").unwrap();

        assert_eq!(claims.iss, "merchant-key");
        assert_eq!(claims.iat, issued.timestamp());
        assert_eq!(claims.nbf, issued.timestamp());
        assert_eq!(claims.exp, issued.timestamp() + 60);
        assert_eq!(claims.form_params, params);

        let jti = base64::engine::general_purpose::STANDARD
            .decode(&claims.jti)
            .unwrap();
        assert_eq!(jti.len(), 32);
    }

    #[test]
    fn test_token_ids_are_unique() {
        let issuer = TokenIssuer::new(Arc::new(FixedClock(Utc::now())));
        let first = decode_claims(&issuer.issue(&profile(), &json!([])).unwrap(), "merchant-secret")
            .unwrap();
        let second = decode_claims(&issuer.issue(&profile(), &json!([])).unwrap(), "merchant-secret")
            .unwrap();
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let issuer = TokenIssuer::new(Arc::new(FixedClock(Utc::now())));
        let token = issuer.issue(&profile(), &json!([])).unwrap();
        assert!(decode_claims(&token, "another-secret").is_err());
    }
}
