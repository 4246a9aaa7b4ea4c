//! Application, offer letter and property closing handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{created, ok, ApiResult, CreatedResult};
use crate::application::{
    Application, ApplicationDetails, ApplicationService, ApplicationStageEntry,
    ClosingDecisionRequest, CreateApplicationRequest, OfferLetterSubmission, PropertyClosing,
};
use crate::middleware::AuthenticatedUser;
use crate::repository::Store;

pub async fn create_application<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Json(request): Json<CreateApplicationRequest>,
) -> CreatedResult<Application> {
    created(service.create_application(&user.actor, request).await?)
}

pub async fn list_applications<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<Application>> {
    ok(service.list_applications(&user.actor).await?)
}

pub async fn get_application<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ApplicationDetails> {
    ok(service.get_application(&user.actor, id).await?)
}

pub async fn list_application_stages<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ApplicationStageEntry>> {
    ok(service.list_stages(&user.actor, id).await?)
}

pub async fn request_offer_letter<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> CreatedResult<OfferLetterSubmission> {
    created(service.request_offer_letter(&user.actor, id).await?)
}

pub async fn request_property_closing<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> CreatedResult<PropertyClosing> {
    created(service.request_property_closing(&user.actor, id).await?)
}

pub async fn respond_to_property_closing<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(closing_id): Path<Uuid>,
    Json(request): Json<ClosingDecisionRequest>,
) -> ApiResult<PropertyClosing> {
    ok(service
        .respond_to_property_closing(&user.actor, closing_id, request.approve)
        .await?)
}
