//! Repository contracts
//!
//! Every method takes an explicit transaction handle obtained from
//! [`Database::begin`]. Nothing is visible to other transactions until
//! [`Database::commit`]; dropping a handle rolls its writes back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::application::{
    Application, ApplicationStageEntry, OfferLetter, PropertyClosing,
};
use crate::dip::{
    ConditionPrecedent, ConditionPrecedentStatus, Dip, Eligibility, LoanOffer,
};
use crate::escrow::{EscrowInformation, EscrowMeetingStatus, EscrowStatus};
use crate::loan::{Loan, RepaymentScheduleEntry};
use crate::models::{DecisionStatus, Organization, Property};
use crate::review::{ReviewApproval, ReviewRequest, ReviewStage};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Database: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// Properties and organizations, owned by other services
#[async_trait]
pub trait DirectoryRepository: Database {
    async fn find_property(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<Option<Property>>;

    async fn find_organization(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<Organization>>;

    async fn find_internal_organization(
        &self,
        tx: &mut Self::Tx,
    ) -> StoreResult<Option<Organization>>;
}

#[async_trait]
pub trait ApplicationRepository: Database {
    async fn insert_application(&self, tx: &mut Self::Tx, app: &Application) -> StoreResult<()>;

    async fn find_application(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<Application>>;

    async fn update_application(&self, tx: &mut Self::Tx, app: &Application) -> StoreResult<()>;

    async fn list_applications_for_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> StoreResult<Vec<Application>>;

    /// Returns false when the (application, stage, actor) entry already exists
    async fn append_stage(
        &self,
        tx: &mut Self::Tx,
        entry: &ApplicationStageEntry,
    ) -> StoreResult<bool>;

    async fn list_stages(
        &self,
        tx: &mut Self::Tx,
        application_id: Uuid,
    ) -> StoreResult<Vec<ApplicationStageEntry>>;
}

#[async_trait]
pub trait ReviewRequestRepository: Database {
    async fn insert_review_request(
        &self,
        tx: &mut Self::Tx,
        request: &ReviewRequest,
    ) -> StoreResult<()>;

    async fn find_review_request(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<ReviewRequest>>;

    /// Moves a Pending request to a terminal status; false if it was not Pending
    async fn finish_review_request(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: DecisionStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Stage configuration for a request type, ordered by `stage_order`
    async fn list_review_stages(
        &self,
        tx: &mut Self::Tx,
        request_type: &str,
    ) -> StoreResult<Vec<ReviewStage>>;

    async fn insert_approval(&self, tx: &mut Self::Tx, approval: &ReviewApproval) -> StoreResult<()>;

    async fn find_approval(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<ReviewApproval>>;

    /// Conditional on the approval still being Pending
    async fn decide_approval(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: DecisionStatus,
        approver_id: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Approvals of one request in creation order
    async fn list_approvals(
        &self,
        tx: &mut Self::Tx,
        review_request_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>>;

    async fn list_pending_approvals(
        &self,
        tx: &mut Self::Tx,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>>;
}

#[async_trait]
pub trait OfferLetterRepository: Database {
    async fn insert_offer_letter(&self, tx: &mut Self::Tx, letter: &OfferLetter) -> StoreResult<()>;

    async fn find_offer_letter(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<OfferLetter>>;

    async fn find_offer_letter_by_review(
        &self,
        tx: &mut Self::Tx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<OfferLetter>>;

    async fn set_offer_letter_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: DecisionStatus,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait ClosingRepository: Database {
    async fn insert_closing(&self, tx: &mut Self::Tx, closing: &PropertyClosing) -> StoreResult<()>;

    async fn find_closing(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<PropertyClosing>>;

    /// Conditional on the closing still being Pending
    async fn decide_closing(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: DecisionStatus,
        decided_by: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait EscrowRepository: Database {
    async fn insert_escrow_status(&self, tx: &mut Self::Tx, status: &EscrowStatus) -> StoreResult<()>;

    async fn find_escrow_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<EscrowStatus>>;

    async fn find_escrow_status_by_review(
        &self,
        tx: &mut Self::Tx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<EscrowStatus>>;

    /// Compare-and-set on the meeting status
    async fn transition_escrow_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        from: EscrowMeetingStatus,
        to: EscrowMeetingStatus,
    ) -> StoreResult<bool>;

    async fn insert_escrow_information(
        &self,
        tx: &mut Self::Tx,
        info: &EscrowInformation,
    ) -> StoreResult<()>;

    async fn find_escrow_information(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<EscrowInformation>>;
}

#[async_trait]
pub trait EligibilityRepository: Database {
    async fn insert_eligibility(&self, tx: &mut Self::Tx, eligibility: &Eligibility) -> StoreResult<()>;

    async fn find_eligibility(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<Eligibility>>;

    async fn update_eligibility(&self, tx: &mut Self::Tx, eligibility: &Eligibility) -> StoreResult<()>;
}

#[async_trait]
pub trait DipRepository: Database {
    /// `Duplicate` when a DIP already exists for the eligibility
    async fn insert_dip(&self, tx: &mut Self::Tx, dip: &Dip) -> StoreResult<()>;

    async fn find_dip(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<Option<Dip>>;

    async fn find_dip_by_eligibility(
        &self,
        tx: &mut Self::Tx,
        eligibility_id: Uuid,
    ) -> StoreResult<Option<Dip>>;

    async fn update_dip(&self, tx: &mut Self::Tx, dip: &Dip) -> StoreResult<()>;

    /// Eligibilities of open mortgage applications whose offer letter is
    /// approved but which never got a DIP
    async fn list_eligibilities_awaiting_dip(&self, tx: &mut Self::Tx) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait LoanOfferRepository: Database {
    async fn insert_loan_offer(&self, tx: &mut Self::Tx, offer: &LoanOffer) -> StoreResult<()>;

    async fn find_loan_offer(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<Option<LoanOffer>>;

    async fn update_loan_offer(&self, tx: &mut Self::Tx, offer: &LoanOffer) -> StoreResult<()>;
}

#[async_trait]
pub trait ConditionPrecedentRepository: Database {
    /// `Duplicate` when the application already has one
    async fn insert_condition_precedent(
        &self,
        tx: &mut Self::Tx,
        cp: &ConditionPrecedent,
    ) -> StoreResult<()>;

    async fn find_condition_precedent(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>>;

    async fn find_condition_precedent_by_application(
        &self,
        tx: &mut Self::Tx,
        application_id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>>;

    async fn set_condition_precedent_status(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        status: ConditionPrecedentStatus,
    ) -> StoreResult<()>;

    /// Pending condition precedents whose application has no loan yet
    async fn list_unoriginated_condition_precedents(
        &self,
        tx: &mut Self::Tx,
    ) -> StoreResult<Vec<ConditionPrecedent>>;
}

#[async_trait]
pub trait LoanRepository: Database {
    /// `Duplicate` when the application already has a loan
    async fn insert_loan(&self, tx: &mut Self::Tx, loan: &Loan) -> StoreResult<()>;

    async fn find_loan(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<Option<Loan>>;

    async fn find_loan_by_application(
        &self,
        tx: &mut Self::Tx,
        application_id: Uuid,
    ) -> StoreResult<Option<Loan>>;

    async fn update_loan(&self, tx: &mut Self::Tx, loan: &Loan) -> StoreResult<()>;

    async fn list_loans_for_user(&self, tx: &mut Self::Tx, user_id: Uuid) -> StoreResult<Vec<Loan>>;
}

#[async_trait]
pub trait LoanRepaymentScheduleRepository: Database {
    async fn insert_schedule(
        &self,
        tx: &mut Self::Tx,
        entries: &[RepaymentScheduleEntry],
    ) -> StoreResult<()>;

    /// Entries of one loan ordered by payment number
    async fn list_schedule(
        &self,
        tx: &mut Self::Tx,
        loan_id: Uuid,
    ) -> StoreResult<Vec<RepaymentScheduleEntry>>;

    async fn find_repayment(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> StoreResult<Option<RepaymentScheduleEntry>>;

    /// Pending entries with `due_date < today`
    async fn list_past_due_repayments(
        &self,
        tx: &mut Self::Tx,
        today: NaiveDate,
    ) -> StoreResult<Vec<RepaymentScheduleEntry>>;

    /// Conditional on the entry still being Pending
    async fn mark_repayment_overdue(&self, tx: &mut Self::Tx, id: Uuid) -> StoreResult<bool>;

    /// Conditional on the entry not being Paid yet
    async fn mark_repayment_paid(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// Everything the services need from storage
pub trait Store:
    DirectoryRepository
    + ApplicationRepository
    + ReviewRequestRepository
    + OfferLetterRepository
    + ClosingRepository
    + EscrowRepository
    + EligibilityRepository
    + DipRepository
    + LoanOfferRepository
    + ConditionPrecedentRepository
    + LoanRepository
    + LoanRepaymentScheduleRepository
{
}

impl<T> Store for T where
    T: DirectoryRepository
        + ApplicationRepository
        + ReviewRequestRepository
        + OfferLetterRepository
        + ClosingRepository
        + EscrowRepository
        + EligibilityRepository
        + DipRepository
        + LoanOfferRepository
        + ConditionPrecedentRepository
        + LoanRepository
        + LoanRepaymentScheduleRepository
{
}
