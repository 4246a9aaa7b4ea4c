//! Payment webhook route

use axum::{routing::post, Router};

use crate::handlers::payment_webhook;
use crate::repository::Store;
use crate::state::AppState;

pub fn payment_routes<S: Store>() -> Router<AppState<S>> {
    Router::new().route("/api/webhooks/payments", post(payment_webhook::<S>))
}
