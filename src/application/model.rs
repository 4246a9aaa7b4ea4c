//! Application aggregate and the narrow records it links to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DecisionStatus;
use crate::review::ReviewApproval;

/// How the buyer pays for the property
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "financing_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FinancingType {
    Outright,
    Installment,
    Mortgage,
}

impl FinancingType {
    pub fn label(&self) -> &'static str {
        match self {
            FinancingType::Outright => "Outright",
            FinancingType::Installment => "Installment",
            FinancingType::Mortgage => "Mortgage",
        }
    }

    /// Installment and mortgage purchases are gated by an approved eligibility
    pub fn requires_eligibility(&self) -> bool {
        !matches!(self, FinancingType::Outright)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Rejected)
    }
}

/// Aggregate root for one buyer's attempt to purchase one property
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Application {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub financing_type: FinancingType,
    pub status: ApplicationStatus,
    pub offer_letter_id: Option<Uuid>,
    pub property_closing_id: Option<Uuid>,
    pub escrow_information_id: Option<Uuid>,
    pub escrow_status_id: Option<Uuid>,
    pub eligibility_id: Option<Uuid>,
    pub dip_id: Option<Uuid>,
    pub loan_offer_id: Option<Uuid>,
    pub condition_precedent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        user_id: Uuid,
        property_id: Uuid,
        financing_type: FinancingType,
        eligibility_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            property_id,
            financing_type,
            status: ApplicationStatus::Pending,
            offer_letter_id: None,
            property_closing_id: None,
            escrow_information_id: None,
            escrow_status_id: None,
            eligibility_id,
            dip_id: None,
            loan_offer_id: None,
            condition_precedent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: ApplicationStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Timestamped milestones appended to an application's history
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "application_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    OfferLetterRequested,
    OfferLetterApproved,
    OfferLetterRejected,
    EscrowMeetingScheduled,
    EscrowMeetingConfirmed,
    PropertyClosingRequested,
    PropertyClosingApproved,
    DipAccepted,
    DueDiligencePaid,
    LoanOfferAccepted,
    ManagementFeePaid,
    LoanGenerated,
}

/// Append-only history row, unique per (application, stage, actor)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ApplicationStageEntry {
    pub id: Uuid,
    pub application_id: Uuid,
    pub stage: ApplicationStage,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ApplicationStageEntry {
    pub fn new(application_id: Uuid, stage: ApplicationStage, actor_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            stage,
            actor_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct OfferLetter {
    pub id: Uuid,
    pub application_id: Uuid,
    pub review_request_id: Uuid,
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct PropertyClosing {
    pub id: Uuid,
    pub application_id: Uuid,
    pub status: DecisionStatus,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for creating an application
#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub property_id: Uuid,
    pub financing_type: FinancingType,
    pub eligibility_id: Option<Uuid>,
}

/// Request DTO for deciding on a property closing
#[derive(Debug, Deserialize)]
pub struct ClosingDecisionRequest {
    pub approve: bool,
}

/// Offer letter together with the approval its review starts with
#[derive(Debug, Serialize)]
pub struct OfferLetterSubmission {
    pub offer_letter: OfferLetter,
    pub approval: ReviewApproval,
}

/// Application together with its stage history
#[derive(Debug, Serialize)]
pub struct ApplicationDetails {
    pub application: Application,
    pub stages: Vec<ApplicationStageEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ApplicationStatus::Pending.is_terminal());
        assert!(!ApplicationStatus::Processing.is_terminal());
        assert!(ApplicationStatus::Completed.is_terminal());
        assert!(ApplicationStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_eligibility_gate() {
        assert!(!FinancingType::Outright.requires_eligibility());
        assert!(FinancingType::Installment.requires_eligibility());
        assert!(FinancingType::Mortgage.requires_eligibility());
    }

    #[test]
    fn test_new_application_has_no_sub_workflows() {
        let app = Application::new(Uuid::new_v4(), Uuid::new_v4(), FinancingType::Outright, None);
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(app.offer_letter_id.is_none());
        assert!(app.dip_id.is_none());
    }
}
