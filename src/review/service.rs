//! Review engine operations

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, Decision, DecisionStatus};
use crate::repository::ReviewRequestRepository;
use crate::review::{
    route_stage, RejectionPolicy, ReviewApproval, ReviewKind, ReviewOutcome, ReviewRequest,
    RoutingContext,
};

/// Multi-stage approval state machine shared by every review flow
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewEngine {
    policy: RejectionPolicy,
}

impl ReviewEngine {
    pub fn new(policy: RejectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RejectionPolicy {
        self.policy
    }

    pub async fn create_review_request<S: ReviewRequestRepository>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        initiator_id: Uuid,
        request_type: &str,
        candidate_name: &str,
    ) -> AppResult<ReviewRequest> {
        let request = ReviewRequest {
            id: Uuid::new_v4(),
            initiator_id,
            request_type: request_type.to_string(),
            status: DecisionStatus::Pending,
            candidate_name: candidate_name.to_string(),
            submitted_at: Utc::now(),
            resolved_at: None,
        };
        store.insert_review_request(tx, &request).await?;
        Ok(request)
    }

    pub async fn create_approval<S: ReviewRequestRepository>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        review_request_id: Uuid,
        stage_id: Uuid,
        organization_id: Uuid,
    ) -> AppResult<ReviewApproval> {
        let approval = ReviewApproval {
            id: Uuid::new_v4(),
            review_request_id,
            stage_id,
            organization_id,
            status: DecisionStatus::Pending,
            approver_id: None,
            decided_at: None,
            created_at: Utc::now(),
        };
        store.insert_approval(tx, &approval).await?;
        Ok(approval)
    }

    /// Create a request and the approval for its first stage only
    pub async fn start<S: ReviewRequestRepository>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        initiator_id: Uuid,
        kind: ReviewKind,
        candidate_name: &str,
        routing: &RoutingContext,
    ) -> AppResult<(ReviewRequest, ReviewApproval)> {
        let request_type = kind.request_type();
        let stages = store.list_review_stages(tx, &request_type).await?;
        let first = stages.first().ok_or_else(|| {
            AppError::Internal(format!("no review stages configured for {}", request_type))
        })?;
        let organization_id = route_stage(first.organization_type, routing)?;

        let request = self
            .create_review_request(store, tx, initiator_id, &request_type, candidate_name)
            .await?;
        let approval = self
            .create_approval(store, tx, request.id, first.id, organization_id)
            .await?;

        tracing::info!(
            review_request_id = %request.id,
            request_type = %request_type,
            stage = %first.name,
            organization_id = %organization_id,
            "Review request started"
        );

        Ok((request, approval))
    }

    /// Record one stage's decision and advance the request
    pub async fn resolve_approval<S: ReviewRequestRepository>(
        &self,
        store: &S,
        tx: &mut S::Tx,
        approval_id: Uuid,
        decision: Decision,
        actor: &Actor,
        routing: &RoutingContext,
    ) -> AppResult<ReviewOutcome> {
        let mut approval = store
            .find_approval(tx, approval_id)
            .await?
            .ok_or_else(|| AppError::not_found("Review approval", approval_id))?;

        if !actor.acts_for(approval.organization_id) {
            return Err(AppError::Forbidden(
                "This approval is assigned to another organization".to_string(),
            ));
        }
        if approval.status != DecisionStatus::Pending {
            return Err(AppError::Forbidden("This approval is already resolved".to_string()));
        }

        let mut request = store
            .find_review_request(tx, approval.review_request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Review request", approval.review_request_id))?;
        if request.status != DecisionStatus::Pending {
            return Err(AppError::Forbidden("This review request is already resolved".to_string()));
        }

        let now = Utc::now();
        let status = decision.status();
        if !store
            .decide_approval(tx, approval.id, status, actor.user_id, now)
            .await?
        {
            return Err(AppError::Forbidden("This approval is already resolved".to_string()));
        }
        approval.status = status;
        approval.approver_id = Some(actor.user_id);
        approval.decided_at = Some(now);

        let stages = store.list_review_stages(tx, &request.request_type).await?;
        if stages.is_empty() {
            return Err(AppError::Internal(format!(
                "no review stages configured for {}",
                request.request_type
            )));
        }
        let position = stages
            .iter()
            .position(|s| s.id == approval.stage_id)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "stage {} is not configured for {}",
                    approval.stage_id, request.request_type
                ))
            })?;

        let terminal = if position + 1 == stages.len() {
            Some(status)
        } else if decision == Decision::Reject && self.policy == RejectionPolicy::Halt {
            Some(DecisionStatus::Rejected)
        } else {
            None
        };

        let next = match terminal {
            Some(final_status) => {
                if !store
                    .finish_review_request(tx, request.id, final_status, now)
                    .await?
                {
                    return Err(AppError::Forbidden(
                        "This review request is already resolved".to_string(),
                    ));
                }
                request.status = final_status;
                request.resolved_at = Some(now);

                tracing::info!(
                    review_request_id = %request.id,
                    status = ?final_status,
                    "Review request resolved"
                );
                None
            }
            None => {
                let stage = &stages[position + 1];
                let organization_id = route_stage(stage.organization_type, routing)?;
                let next = self
                    .create_approval(store, tx, request.id, stage.id, organization_id)
                    .await?;

                tracing::info!(
                    review_request_id = %request.id,
                    stage = %stage.name,
                    organization_id = %organization_id,
                    "Review request advanced"
                );
                Some(next)
            }
        };

        Ok(ReviewOutcome {
            request,
            resolved: approval,
            next,
            terminal,
        })
    }
}
