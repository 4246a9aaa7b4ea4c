//! Payment provider webhook

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use super::{ok, ApiResult};
use crate::error::AppError;
use crate::payments::{verify_signature, PaymentEvent, PaymentOutcome, SIGNATURE_HEADER};
use crate::repository::Store;
use crate::state::AppState;

/// Verify the signature over the raw body before parsing anything
pub async fn payment_webhook<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<PaymentOutcome> {
    let Some(secret) = state.payment_webhook_secret.as_deref() else {
        tracing::warn!("Payment webhook called but no secret is configured");
        return Err(AppError::Unauthorized(
            "Payment webhook is not configured".to_string(),
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing payment signature".to_string()))?;
    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Payment webhook signature mismatch");
        return Err(AppError::Unauthorized("Invalid payment signature".to_string()));
    }

    let event: PaymentEvent = serde_json::from_slice(&body)?;
    ok(state.services.payments.handle_event(event).await?)
}
