//! Eligibility, DIP and loan offer route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::repository::Store;
use crate::state::AppState;

pub fn dip_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/eligibilities", post(submit_eligibility::<S>))
        .route("/api/eligibilities/:id", get(get_eligibility::<S>))
        .route(
            "/api/eligibilities/:id/review",
            post(review_eligibility::<S>),
        )
        .route("/api/dips/:id", get(get_dip::<S>))
        .route(
            "/api/dips/:id/lender-response",
            post(lender_respond_to_dip::<S>),
        )
        .route(
            "/api/dips/:id/user-response",
            post(user_respond_to_dip::<S>),
        )
        .route("/api/dips/:id/documents", post(submit_dip_documents::<S>))
        .route(
            "/api/dips/:id/complete-review",
            post(complete_dip_review::<S>),
        )
        .route("/api/loan-offers/:id", get(get_loan_offer::<S>))
        .route(
            "/api/loan-offers/:id/respond",
            post(respond_to_loan_offer::<S>),
        )
}
