//! Review request models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::FinancingType;
use crate::models::{Decision, DecisionStatus, OrganizationType};

/// The approval processes this backend drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    OfferLetter(FinancingType),
    EscrowMeeting,
}

impl ReviewKind {
    /// Label stored on review requests and stage configuration rows
    pub fn request_type(&self) -> String {
        match self {
            ReviewKind::OfferLetter(financing) => format!("Offer Letter - {}", financing.label()),
            ReviewKind::EscrowMeeting => "Escrow Meeting Request".to_string(),
        }
    }
}

/// What happens when a non-final stage rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    /// The request is rejected immediately and no further stages are created
    #[default]
    Halt,
    /// The rejection is recorded and the next stage is still created; the
    /// final stage decides the request
    Continue,
}

impl RejectionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "halt" => Some(RejectionPolicy::Halt),
            "continue" => Some(RejectionPolicy::Continue),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ReviewRequest {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub request_type: String,
    pub status: DecisionStatus,
    pub candidate_name: String,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Stage configuration row, ordered by `stage_order` within a request type
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ReviewStage {
    pub id: Uuid,
    pub request_type: String,
    pub name: String,
    pub organization_type: OrganizationType,
    pub stage_order: i32,
}

/// One stage instance of a review request
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ReviewApproval {
    pub id: Uuid,
    pub review_request_id: Uuid,
    pub stage_id: Uuid,
    pub organization_id: Uuid,
    pub status: DecisionStatus,
    pub approver_id: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of resolving one approval
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub request: ReviewRequest,
    pub resolved: ReviewApproval,
    /// Approval created for the following stage, if any
    pub next: Option<ReviewApproval>,
    /// Set when this resolution ended the request
    pub terminal: Option<DecisionStatus>,
}

/// Request DTO for resolving an approval
#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_labels() {
        assert_eq!(
            ReviewKind::OfferLetter(FinancingType::Outright).request_type(),
            "Offer Letter - Outright"
        );
        assert_eq!(
            ReviewKind::EscrowMeeting.request_type(),
            "Escrow Meeting Request"
        );
    }

    #[test]
    fn test_rejection_policy_parse() {
        assert_eq!(RejectionPolicy::parse("HALT"), Some(RejectionPolicy::Halt));
        assert_eq!(RejectionPolicy::parse("continue"), Some(RejectionPolicy::Continue));
        assert_eq!(RejectionPolicy::parse("skip"), None);
    }
}
