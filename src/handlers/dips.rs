//! Eligibility, DIP and loan offer handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{created, ok, ApiResult, CreatedResult};
use crate::dip::{
    AcceptanceRequest, Dip, DipService, Eligibility, EligibilityReviewRequest, LoanOffer,
    SubmitEligibilityRequest,
};
use crate::middleware::AuthenticatedUser;
use crate::repository::Store;

pub async fn submit_eligibility<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Json(request): Json<SubmitEligibilityRequest>,
) -> CreatedResult<Eligibility> {
    created(service.submit_eligibility(&user.actor, request).await?)
}

pub async fn get_eligibility<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Eligibility> {
    ok(service.get_eligibility(&user.actor, id).await?)
}

pub async fn review_eligibility<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<EligibilityReviewRequest>,
) -> ApiResult<Eligibility> {
    ok(service.review_eligibility(&user.actor, id, request).await?)
}

pub async fn get_dip<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Dip> {
    ok(service.get_dip(&user.actor, id).await?)
}

pub async fn lender_respond_to_dip<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptanceRequest>,
) -> ApiResult<Dip> {
    ok(service.lender_respond(&user.actor, id, request.accept).await?)
}

pub async fn user_respond_to_dip<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptanceRequest>,
) -> ApiResult<Dip> {
    ok(service.user_respond(&user.actor, id, request.accept).await?)
}

pub async fn submit_dip_documents<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Dip> {
    ok(service.submit_documents(&user.actor, id).await?)
}

pub async fn complete_dip_review<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> CreatedResult<LoanOffer> {
    created(service.complete_review(&user.actor, id).await?)
}

pub async fn get_loan_offer<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanOffer> {
    ok(service.get_loan_offer(&user.actor, id).await?)
}

pub async fn respond_to_loan_offer<S: Store>(
    State(service): State<DipService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AcceptanceRequest>,
) -> ApiResult<LoanOffer> {
    ok(service
        .respond_to_loan_offer(&user.actor, id, request.accept)
        .await?)
}
