//! Mortgage decision models: eligibility, decision in principle, loan offer
//! and condition precedent

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::loan::RepaymentFrequency;
use crate::models::DecisionStatus;

/// Pre-qualification of a buyer with a lender
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Eligibility {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub user_id: Uuid,
    pub lender_organization_id: Uuid,
    pub requested_amount: Decimal,
    pub monthly_income: Decimal,
    pub term_months: i32,
    pub repayment_frequency: RepaymentFrequency,
    /// Set by the lender on approval
    pub interest_rate: Option<Decimal>,
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "lender_decision", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LenderDecision {
    Accepted,
    Rejected,
}

impl LenderDecision {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            LenderDecision::Accepted
        } else {
            LenderDecision::Rejected
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_decision", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserDecision {
    Accept,
    Reject,
}

impl UserDecision {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            UserDecision::Accept
        } else {
            UserDecision::Reject
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "dip_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DipStatus {
    Generated,
    AwaitingLenderAction,
    AwaitingUserAction,
    Rejected,
    PaymentPending,
    DocumentsPending,
    DocumentReviewing,
    Completed,
}

impl DipStatus {
    /// Aggregate status implied by the two independent decisions
    pub fn from_decisions(lender: Option<LenderDecision>, user: Option<UserDecision>) -> Self {
        match (lender, user) {
            (None, _) => DipStatus::AwaitingLenderAction,
            (Some(LenderDecision::Rejected), _) => DipStatus::Rejected,
            (Some(LenderDecision::Accepted), None) => DipStatus::AwaitingUserAction,
            (Some(LenderDecision::Accepted), Some(UserDecision::Reject)) => DipStatus::Rejected,
            (Some(LenderDecision::Accepted), Some(UserDecision::Accept)) => {
                DipStatus::PaymentPending
            }
        }
    }

    /// The lender may (re)decide only until the borrower has answered
    pub fn open_to_lender(&self) -> bool {
        matches!(
            self,
            DipStatus::Generated | DipStatus::AwaitingLenderAction | DipStatus::AwaitingUserAction
        )
    }
}

/// Decision in Principle
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Dip {
    pub id: Uuid,
    pub application_id: Uuid,
    pub eligibility_id: Uuid,
    pub lender_status: Option<LenderDecision>,
    pub user_status: Option<UserDecision>,
    pub status: DipStatus,
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub term_months: i32,
    pub repayment_frequency: RepaymentFrequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dip {
    pub fn set_status(&mut self, status: DipStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_offer_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanOfferStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct LoanOffer {
    pub id: Uuid,
    pub application_id: Uuid,
    pub dip_id: Uuid,
    pub principal: Decimal,
    pub interest_rate: Decimal,
    pub term_months: i32,
    pub repayment_frequency: RepaymentFrequency,
    pub status: LoanOfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "condition_precedent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConditionPrecedentStatus {
    Pending,
    Completed,
}

/// Gate that must clear before loan origination
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct ConditionPrecedent {
    pub id: Uuid,
    pub application_id: Uuid,
    pub loan_offer_id: Uuid,
    pub status: ConditionPrecedentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for submitting an eligibility check
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitEligibilityRequest {
    pub lender_organization_id: Uuid,
    pub requested_amount: Decimal,
    pub monthly_income: Decimal,
    #[validate(range(min = 1, max = 480))]
    pub term_months: i32,
    pub repayment_frequency: RepaymentFrequency,
}

impl SubmitEligibilityRequest {
    pub fn validate_amounts(&self) -> Result<(), String> {
        if self.requested_amount <= Decimal::ZERO {
            return Err("Requested amount must be greater than 0".to_string());
        }
        if self.monthly_income <= Decimal::ZERO {
            return Err("Monthly income must be greater than 0".to_string());
        }
        let term = u32::try_from(self.term_months).unwrap_or(0);
        if self.repayment_frequency.payment_count(term) == 0 {
            return Err(format!(
                "A {}-month term yields no {:?} repayments",
                self.term_months, self.repayment_frequency
            ));
        }
        Ok(())
    }
}

/// Request DTO for a lender's eligibility verdict
#[derive(Debug, Deserialize)]
pub struct EligibilityReviewRequest {
    pub approve: bool,
    /// Required when approving; either a fraction (0.12) or a percentage (12)
    pub interest_rate: Option<Decimal>,
}

/// Request DTO for an accept/reject answer
#[derive(Debug, Deserialize)]
pub struct AcceptanceRequest {
    pub accept: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_from_decisions() {
        use LenderDecision::*;
        use UserDecision::*;

        assert_eq!(DipStatus::from_decisions(None, None), DipStatus::AwaitingLenderAction);
        assert_eq!(DipStatus::from_decisions(Some(Rejected), None), DipStatus::Rejected);
        assert_eq!(
            DipStatus::from_decisions(Some(Accepted), None),
            DipStatus::AwaitingUserAction
        );
        assert_eq!(
            DipStatus::from_decisions(Some(Accepted), Some(Accept)),
            DipStatus::PaymentPending
        );
        assert_eq!(
            DipStatus::from_decisions(Some(Accepted), Some(Reject)),
            DipStatus::Rejected
        );
    }

    #[test]
    fn test_lender_window() {
        assert!(DipStatus::Generated.open_to_lender());
        assert!(DipStatus::AwaitingUserAction.open_to_lender());
        assert!(!DipStatus::PaymentPending.open_to_lender());
        assert!(!DipStatus::Rejected.open_to_lender());
    }

    #[test]
    fn test_eligibility_amount_validation() {
        let mut req = SubmitEligibilityRequest {
            lender_organization_id: Uuid::new_v4(),
            requested_amount: dec!(1200000),
            monthly_income: dec!(450000),
            term_months: 12,
            repayment_frequency: RepaymentFrequency::Monthly,
        };
        assert!(req.validate().is_ok());
        assert!(req.validate_amounts().is_ok());

        req.requested_amount = Decimal::ZERO;
        assert!(req.validate_amounts().is_err());

        req.requested_amount = dec!(1000);
        req.term_months = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_term_shorter_than_one_period_rejected() {
        let mut req = SubmitEligibilityRequest {
            lender_organization_id: Uuid::new_v4(),
            requested_amount: dec!(1200000),
            monthly_income: dec!(450000),
            term_months: 6,
            repayment_frequency: RepaymentFrequency::Annually,
        };
        assert!(req.validate_amounts().is_err());

        req.term_months = 2;
        req.repayment_frequency = RepaymentFrequency::Quarterly;
        assert!(req.validate_amounts().is_err());

        req.term_months = 12;
        req.repayment_frequency = RepaymentFrequency::Annually;
        assert!(req.validate_amounts().is_ok());
    }
}
