use anyhow::{anyhow, Context, Result};
use std::env;

use crate::payments::types::PaymentProfile;
use crate::payments::BaoKimConfig;

/// Route the gateway posts payment notifications to
pub const CALLBACK_PATH: &str = "/payment/callback/baokim";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: BaoKimConfig,
    /// Profile seeded into the in-memory store, when credentials are set
    pub demo_profile: Option<PaymentProfile>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Externally reachable base URL of this service
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .context("PORT not set")?
            .parse()
            .context("PORT must be a valid number")?;

        let server = ServerConfig {
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            host,
            port,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let gateway = BaoKimConfig::from_env().context("Invalid BaoKim configuration")?;

        let demo_profile = match (env::var("BAOKIM_API_KEY"), env::var("BAOKIM_API_SECRET")) {
            (Ok(api_key), Ok(api_secret)) => Some(PaymentProfile {
                profile_id: env::var("BAOKIM_PROFILE_ID").unwrap_or_else(|_| "1".to_string()),
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let config = Config {
            server,
            gateway,
            demo_profile,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.server.public_url.trim().is_empty() {
            return Err(anyhow!("PUBLIC_URL cannot be empty"));
        }

        if self.gateway.endpoint().is_empty() {
            return Err(anyhow!("BaoKim endpoint URL cannot be empty"));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(anyhow!("BAOKIM_TIMEOUT_SECS must be greater than 0"));
        }

        if self.gateway.live_payments && self.server.environment != "production" {
            tracing::warn!(
                "Live payments enabled outside production ({})",
                self.server.environment
            );
        }

        if let Some(profile) = &self.demo_profile {
            profile
                .verify_config()
                .context("Invalid BAOKIM_API_KEY / BAOKIM_API_SECRET")?;
        }

        Ok(())
    }

    /// Webhook URL handed to the gateway with every order
    pub fn webhook_url(&self) -> String {
        format!(
            "{}{}",
            self.server.public_url.trim_end_matches('/'),
            CALLBACK_PATH
        )
    }
}
