use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Redirect,
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::payments::traits::{PaymentProfileStore, PurchaseRequestStore};
use crate::payments::types::{
    ChannelSelection, InitiateView, PaymentProfile, Purchase, PurchaseRequest,
};

async fn load(
    state: &AppState,
    request_key: &str,
) -> Result<(PurchaseRequest, Purchase, PaymentProfile), ApiError> {
    let unknown = || ApiError::not_found(format!("Unknown purchase request {}", request_key));

    let request = state
        .store
        .find_request(request_key)
        .await?
        .ok_or_else(unknown)?;
    let purchase = state
        .store
        .find_purchase(request_key)
        .await?
        .ok_or_else(unknown)?;
    let profile = state
        .store
        .find_profile(&request.payment_profile_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment profile is not configured"))?;

    Ok((request, purchase, profile))
}

/// Bank selection data for one purchase request
pub async fn initiate(
    State(state): State<AppState>,
    Path(request_key): Path<String>,
) -> Result<Json<InitiateView>, ApiError> {
    let (request, purchase, profile) = load(&state, &request_key).await?;
    let view = state.checkout.initiate(&request, &profile, &purchase).await?;
    Ok(Json(view))
}

/// Create the gateway order and send the payer there
pub async fn submit(
    State(state): State<AppState>,
    Path(request_key): Path<String>,
    Form(selection): Form<ChannelSelection>,
) -> Result<Redirect, ApiError> {
    let (request, purchase, profile) = load(&state, &request_key).await?;
    let target = state
        .checkout
        .submit(&selection, &request, &profile, &purchase)
        .await?;
    Ok(Redirect::to(&target.url))
}

#[derive(Debug, Deserialize)]
pub struct NewPurchaseRequest {
    pub request: PurchaseRequest,
    pub purchase: Purchase,
}

#[derive(Debug, Serialize)]
pub struct RegisteredPurchase {
    pub request_key: String,
    pub checkout_url: String,
}

/// Register a purchase request, standing in for the host application
pub async fn register_purchase(
    State(state): State<AppState>,
    Json(body): Json<NewPurchaseRequest>,
) -> (StatusCode, Json<RegisteredPurchase>) {
    let request_key = body.request.request_key.clone();
    info!("Registering purchase request {}", request_key);
    state.store.insert_request(body.request, body.purchase).await;

    (
        StatusCode::CREATED,
        Json(RegisteredPurchase {
            checkout_url: format!("/payment/baokim/{}", request_key),
            request_key,
        }),
    )
}
