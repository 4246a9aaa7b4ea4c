//! Escrow meeting handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::{created, ok, ApiResult, CreatedResult};
use crate::escrow::{
    EscrowMeeting, EscrowMeetingResponse, EscrowService, EscrowStatus,
    ScheduleEscrowMeetingRequest,
};
use crate::middleware::AuthenticatedUser;
use crate::repository::Store;

pub async fn schedule_escrow_meeting<S: Store>(
    State(service): State<EscrowService<S>>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
    Json(request): Json<ScheduleEscrowMeetingRequest>,
) -> CreatedResult<EscrowMeeting> {
    created(
        service
            .schedule_escrow_meeting(&user.actor, application_id, request)
            .await?,
    )
}

pub async fn get_escrow_meeting<S: Store>(
    State(service): State<EscrowService<S>>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
) -> ApiResult<EscrowMeeting> {
    ok(service.get_escrow_meeting(&user.actor, application_id).await?)
}

pub async fn respond_to_escrow_meeting<S: Store>(
    State(service): State<EscrowService<S>>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
    Json(request): Json<EscrowMeetingResponse>,
) -> ApiResult<EscrowStatus> {
    ok(service
        .respond_to_escrow_meeting(&user.actor, application_id, request.accept)
        .await?)
}
