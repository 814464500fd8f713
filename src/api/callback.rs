use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};

use super::AppState;

/// Webhook for BaoKim payment notifications
///
/// The body is handed over untouched; the validator decides the answer.
pub async fn baokim_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = state.callbacks.handle(&body, client_ip(&headers)).await;
    let response = result.response();

    if result.is_received() {
        (
            response.status,
            [(header::CONTENT_TYPE, "application/json")],
            response.body,
        )
            .into_response()
    } else {
        (response.status, response.body).into_response()
    }
}

/// First hop of `x-forwarded-for`, falling back to `x-real-ip`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
