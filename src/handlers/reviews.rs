//! Review approval handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{ok, ApiResult};
use crate::application::ApplicationService;
use crate::middleware::AuthenticatedUser;
use crate::repository::Store;
use crate::review::{ResolveApprovalRequest, ReviewApproval, ReviewOutcome};

pub async fn list_pending_approvals<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<ReviewApproval>> {
    ok(service.list_pending_approvals(&user.actor).await?)
}

pub async fn resolve_review_approval<S: Store>(
    State(service): State<ApplicationService<S>>,
    user: AuthenticatedUser,
    Path(approval_id): Path<Uuid>,
    Json(request): Json<ResolveApprovalRequest>,
) -> ApiResult<ReviewOutcome> {
    ok(service
        .resolve_review_approval(&user.actor, approval_id, request.decision)
        .await?)
}
