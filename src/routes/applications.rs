//! Application, review and escrow route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::repository::Store;
use crate::state::AppState;

pub fn application_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/api/applications",
            post(create_application::<S>).get(list_applications::<S>),
        )
        .route("/api/applications/:id", get(get_application::<S>))
        .route(
            "/api/applications/:id/stages",
            get(list_application_stages::<S>),
        )
        .route(
            "/api/applications/:id/offer-letter",
            post(request_offer_letter::<S>),
        )
        .route(
            "/api/applications/:id/property-closing",
            post(request_property_closing::<S>),
        )
        .route(
            "/api/applications/:id/escrow-meeting",
            post(schedule_escrow_meeting::<S>).get(get_escrow_meeting::<S>),
        )
        .route(
            "/api/applications/:id/escrow-meeting/respond",
            post(respond_to_escrow_meeting::<S>),
        )
        .route(
            "/api/property-closings/:id/respond",
            post(respond_to_property_closing::<S>),
        )
        .route(
            "/api/review-approvals/pending",
            get(list_pending_approvals::<S>),
        )
        .route(
            "/api/review-approvals/:id/resolve",
            post(resolve_review_approval::<S>),
        )
}
