//! Loan route definitions

use axum::{routing::get, Router};

use crate::handlers::*;
use crate::repository::Store;
use crate::state::AppState;

pub fn loan_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/loans", get(list_loans::<S>))
        .route("/api/loans/:id", get(get_loan::<S>))
        .route("/api/loans/:id/schedule", get(get_loan_schedule::<S>))
}
