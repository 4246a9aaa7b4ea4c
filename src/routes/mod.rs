//! Route definitions for the HSF API

mod applications;
mod dips;
mod loans;
mod payments;

pub use applications::application_routes;
pub use dips::dip_routes;
pub use loans::loan_routes;
pub use payments::payment_routes;

use axum::{routing::get, Router};

use crate::handlers::{health_check, root};
use crate::middleware;
use crate::repository::Store;
use crate::state::AppState;

/// Every route, state not yet applied
pub fn api_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check::<S>))
        .merge(application_routes::<S>())
        .merge(dip_routes::<S>())
        .merge(loan_routes::<S>())
        .merge(payment_routes::<S>())
}

/// Router with state applied and the middleware every deployment needs
pub fn app<S: Store>(state: AppState<S>) -> Router {
    api_routes::<S>()
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
