use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub live_payments: bool,
    pub protocol: String,
    pub auth: String,
}

pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let version = env!("CARGO_PKG_VERSION").to_string();
    let gateway = &state.config.gateway;

    let response = HealthResponse {
        status: "healthy".to_string(),
        version,
        environment: state.config.server.environment.clone(),
        live_payments: gateway.live_payments,
        protocol: gateway.protocol.variant.to_string(),
        auth: format!("{:?}", gateway.protocol.auth).to_lowercase(),
    };

    Ok(Json(response))
}
