//! In-process store
//!
//! A transaction takes the store lock and works on a private copy of the
//! state; commit writes the copy back. Transactions are therefore serialized
//! and a dropped handle leaves the shared state untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::*;
use crate::application::{ApplicationStatus, FinancingType};
use crate::loan::RepaymentStatus;
use crate::models::OrganizationType;

/// Id of the seeded internal organization
pub const INTERNAL_ORGANIZATION_ID: Uuid = Uuid::from_u128(1);

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    properties: HashMap<Uuid, Property>,
    organizations: HashMap<Uuid, Organization>,
    applications: HashMap<Uuid, Application>,
    stages: Vec<ApplicationStageEntry>,
    review_requests: HashMap<Uuid, ReviewRequest>,
    review_stages: Vec<ReviewStage>,
    approvals: Vec<ReviewApproval>,
    offer_letters: HashMap<Uuid, OfferLetter>,
    closings: HashMap<Uuid, PropertyClosing>,
    escrow_statuses: HashMap<Uuid, EscrowStatus>,
    escrow_informations: HashMap<Uuid, EscrowInformation>,
    eligibilities: HashMap<Uuid, Eligibility>,
    dips: HashMap<Uuid, Dip>,
    loan_offers: HashMap<Uuid, LoanOffer>,
    condition_precedents: HashMap<Uuid, ConditionPrecedent>,
    loans: HashMap<Uuid, Loan>,
    repayments: Vec<RepaymentScheduleEntry>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the internal organization and the stage
    /// configuration the migrations seed
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.organizations.insert(
            INTERNAL_ORGANIZATION_ID,
            Organization {
                id: INTERNAL_ORGANIZATION_ID,
                name: "HSF".to_string(),
                organization_type: OrganizationType::Internal,
            },
        );
        state.review_stages = default_review_stages();

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn seed_organization(&self, organization: Organization) {
        self.state
            .lock()
            .await
            .organizations
            .insert(organization.id, organization);
    }

    pub async fn seed_property(&self, property: Property) {
        self.state.lock().await.properties.insert(property.id, property);
    }

    /// Replace the stage configuration of one request type
    pub async fn seed_review_stages(&self, request_type: &str, stages: Vec<ReviewStage>) {
        let mut state = self.state.lock().await;
        state.review_stages.retain(|s| s.request_type != request_type);
        state.review_stages.extend(stages);
    }
}

fn default_review_stages() -> Vec<ReviewStage> {
    let rows = [
        ("Offer Letter - Outright", "Developer Review", OrganizationType::Developer, 1),
        ("Offer Letter - Outright", "HSF Review", OrganizationType::Internal, 2),
        ("Offer Letter - Installment", "Developer Review", OrganizationType::Developer, 1),
        ("Offer Letter - Installment", "HSF Review", OrganizationType::Internal, 2),
        ("Offer Letter - Mortgage", "Developer Review", OrganizationType::Developer, 1),
        ("Offer Letter - Mortgage", "HSF Review", OrganizationType::Internal, 2),
        ("Escrow Meeting Request", "HSF Confirmation", OrganizationType::Internal, 1),
        ("Escrow Meeting Request", "Developer Confirmation", OrganizationType::Developer, 2),
    ];

    rows.into_iter()
        .enumerate()
        .map(|(i, (request_type, name, organization_type, stage_order))| ReviewStage {
            id: Uuid::from_u128(0x1000_0000_0000_0000_0000_0000_0000_0000 + i as u128 + 1),
            request_type: request_type.to_string(),
            name: name.to_string(),
            organization_type,
            stage_order,
        })
        .collect()
}

#[async_trait]
impl Database for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = tx;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl DirectoryRepository for MemoryStore {
    async fn find_property(&self, tx: &mut MemoryTx, id: Uuid) -> StoreResult<Option<Property>> {
        Ok(tx.working.properties.get(&id).cloned())
    }

    async fn find_organization(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<Organization>> {
        Ok(tx.working.organizations.get(&id).cloned())
    }

    async fn find_internal_organization(
        &self,
        tx: &mut MemoryTx,
    ) -> StoreResult<Option<Organization>> {
        Ok(tx
            .working
            .organizations
            .values()
            .find(|o| o.organization_type == OrganizationType::Internal)
            .cloned())
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn insert_application(&self, tx: &mut MemoryTx, app: &Application) -> StoreResult<()> {
        if tx.working.applications.contains_key(&app.id) {
            return Err(StoreError::Duplicate("application".to_string()));
        }
        tx.working.applications.insert(app.id, app.clone());
        Ok(())
    }

    async fn find_application(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<Application>> {
        Ok(tx.working.applications.get(&id).cloned())
    }

    async fn update_application(&self, tx: &mut MemoryTx, app: &Application) -> StoreResult<()> {
        tx.working.applications.insert(app.id, app.clone());
        Ok(())
    }

    async fn list_applications_for_user(
        &self,
        tx: &mut MemoryTx,
        user_id: Uuid,
    ) -> StoreResult<Vec<Application>> {
        let mut apps: Vec<Application> = tx
            .working
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        apps.sort_by_key(|a| a.created_at);
        Ok(apps)
    }

    async fn append_stage(
        &self,
        tx: &mut MemoryTx,
        entry: &ApplicationStageEntry,
    ) -> StoreResult<bool> {
        let exists = tx.working.stages.iter().any(|s| {
            s.application_id == entry.application_id
                && s.stage == entry.stage
                && s.actor_id == entry.actor_id
        });
        if exists {
            return Ok(false);
        }
        tx.working.stages.push(entry.clone());
        Ok(true)
    }

    async fn list_stages(
        &self,
        tx: &mut MemoryTx,
        application_id: Uuid,
    ) -> StoreResult<Vec<ApplicationStageEntry>> {
        Ok(tx
            .working
            .stages
            .iter()
            .filter(|s| s.application_id == application_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReviewRequestRepository for MemoryStore {
    async fn insert_review_request(
        &self,
        tx: &mut MemoryTx,
        request: &ReviewRequest,
    ) -> StoreResult<()> {
        tx.working.review_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_review_request(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<ReviewRequest>> {
        Ok(tx.working.review_requests.get(&id).cloned())
    }

    async fn finish_review_request(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: DecisionStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match tx.working.review_requests.get_mut(&id) {
            Some(request) if request.status == DecisionStatus::Pending => {
                request.status = status;
                request.resolved_at = Some(resolved_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_review_stages(
        &self,
        tx: &mut MemoryTx,
        request_type: &str,
    ) -> StoreResult<Vec<ReviewStage>> {
        let mut stages: Vec<ReviewStage> = tx
            .working
            .review_stages
            .iter()
            .filter(|s| s.request_type == request_type)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.stage_order);
        Ok(stages)
    }

    async fn insert_approval(&self, tx: &mut MemoryTx, approval: &ReviewApproval) -> StoreResult<()> {
        let exists = tx.working.approvals.iter().any(|a| {
            a.review_request_id == approval.review_request_id && a.stage_id == approval.stage_id
        });
        if exists {
            return Err(StoreError::Duplicate("review approval".to_string()));
        }
        tx.working.approvals.push(approval.clone());
        Ok(())
    }

    async fn find_approval(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<ReviewApproval>> {
        Ok(tx.working.approvals.iter().find(|a| a.id == id).cloned())
    }

    async fn decide_approval(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: DecisionStatus,
        approver_id: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match tx
            .working
            .approvals
            .iter_mut()
            .find(|a| a.id == id && a.status == DecisionStatus::Pending)
        {
            Some(approval) => {
                approval.status = status;
                approval.approver_id = Some(approver_id);
                approval.decided_at = Some(decided_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_approvals(
        &self,
        tx: &mut MemoryTx,
        review_request_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>> {
        Ok(tx
            .working
            .approvals
            .iter()
            .filter(|a| a.review_request_id == review_request_id)
            .cloned()
            .collect())
    }

    async fn list_pending_approvals(
        &self,
        tx: &mut MemoryTx,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>> {
        Ok(tx
            .working
            .approvals
            .iter()
            .filter(|a| a.organization_id == organization_id && a.status == DecisionStatus::Pending)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OfferLetterRepository for MemoryStore {
    async fn insert_offer_letter(&self, tx: &mut MemoryTx, letter: &OfferLetter) -> StoreResult<()> {
        tx.working.offer_letters.insert(letter.id, letter.clone());
        Ok(())
    }

    async fn find_offer_letter(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<OfferLetter>> {
        Ok(tx.working.offer_letters.get(&id).cloned())
    }

    async fn find_offer_letter_by_review(
        &self,
        tx: &mut MemoryTx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<OfferLetter>> {
        Ok(tx
            .working
            .offer_letters
            .values()
            .find(|l| l.review_request_id == review_request_id)
            .cloned())
    }

    async fn set_offer_letter_status(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: DecisionStatus,
    ) -> StoreResult<()> {
        if let Some(letter) = tx.working.offer_letters.get_mut(&id) {
            letter.status = status;
            letter.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ClosingRepository for MemoryStore {
    async fn insert_closing(&self, tx: &mut MemoryTx, closing: &PropertyClosing) -> StoreResult<()> {
        tx.working.closings.insert(closing.id, closing.clone());
        Ok(())
    }

    async fn find_closing(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<PropertyClosing>> {
        Ok(tx.working.closings.get(&id).cloned())
    }

    async fn decide_closing(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: DecisionStatus,
        decided_by: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match tx.working.closings.get_mut(&id) {
            Some(closing) if closing.status == DecisionStatus::Pending => {
                closing.status = status;
                closing.decided_by = Some(decided_by);
                closing.decided_at = Some(decided_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl EscrowRepository for MemoryStore {
    async fn insert_escrow_status(&self, tx: &mut MemoryTx, status: &EscrowStatus) -> StoreResult<()> {
        tx.working.escrow_statuses.insert(status.id, status.clone());
        Ok(())
    }

    async fn find_escrow_status(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<EscrowStatus>> {
        Ok(tx.working.escrow_statuses.get(&id).cloned())
    }

    async fn find_escrow_status_by_review(
        &self,
        tx: &mut MemoryTx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<EscrowStatus>> {
        Ok(tx
            .working
            .escrow_statuses
            .values()
            .find(|s| s.review_request_id == review_request_id)
            .cloned())
    }

    async fn transition_escrow_status(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        from: EscrowMeetingStatus,
        to: EscrowMeetingStatus,
    ) -> StoreResult<bool> {
        match tx.working.escrow_statuses.get_mut(&id) {
            Some(status) if status.status == from => {
                status.status = to;
                status.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_escrow_information(
        &self,
        tx: &mut MemoryTx,
        info: &EscrowInformation,
    ) -> StoreResult<()> {
        tx.working.escrow_informations.insert(info.id, info.clone());
        Ok(())
    }

    async fn find_escrow_information(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<EscrowInformation>> {
        Ok(tx.working.escrow_informations.get(&id).cloned())
    }
}

#[async_trait]
impl EligibilityRepository for MemoryStore {
    async fn insert_eligibility(&self, tx: &mut MemoryTx, eligibility: &Eligibility) -> StoreResult<()> {
        tx.working.eligibilities.insert(eligibility.id, eligibility.clone());
        Ok(())
    }

    async fn find_eligibility(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<Eligibility>> {
        Ok(tx.working.eligibilities.get(&id).cloned())
    }

    async fn update_eligibility(&self, tx: &mut MemoryTx, eligibility: &Eligibility) -> StoreResult<()> {
        tx.working.eligibilities.insert(eligibility.id, eligibility.clone());
        Ok(())
    }
}

#[async_trait]
impl DipRepository for MemoryStore {
    async fn insert_dip(&self, tx: &mut MemoryTx, dip: &Dip) -> StoreResult<()> {
        if tx
            .working
            .dips
            .values()
            .any(|d| d.eligibility_id == dip.eligibility_id)
        {
            return Err(StoreError::Duplicate("dip".to_string()));
        }
        tx.working.dips.insert(dip.id, dip.clone());
        Ok(())
    }

    async fn find_dip(&self, tx: &mut MemoryTx, id: Uuid) -> StoreResult<Option<Dip>> {
        Ok(tx.working.dips.get(&id).cloned())
    }

    async fn find_dip_by_eligibility(
        &self,
        tx: &mut MemoryTx,
        eligibility_id: Uuid,
    ) -> StoreResult<Option<Dip>> {
        Ok(tx
            .working
            .dips
            .values()
            .find(|d| d.eligibility_id == eligibility_id)
            .cloned())
    }

    async fn update_dip(&self, tx: &mut MemoryTx, dip: &Dip) -> StoreResult<()> {
        tx.working.dips.insert(dip.id, dip.clone());
        Ok(())
    }

    async fn list_eligibilities_awaiting_dip(&self, tx: &mut MemoryTx) -> StoreResult<Vec<Uuid>> {
        let state = &tx.working;
        Ok(state
            .applications
            .values()
            .filter(|a| a.financing_type == FinancingType::Mortgage)
            .filter(|a| a.status == ApplicationStatus::Processing && a.dip_id.is_none())
            .filter(|a| {
                a.offer_letter_id
                    .and_then(|id| state.offer_letters.get(&id))
                    .is_some_and(|letter| letter.status == DecisionStatus::Approved)
            })
            .filter_map(|a| a.eligibility_id)
            .collect())
    }
}

#[async_trait]
impl LoanOfferRepository for MemoryStore {
    async fn insert_loan_offer(&self, tx: &mut MemoryTx, offer: &LoanOffer) -> StoreResult<()> {
        tx.working.loan_offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn find_loan_offer(&self, tx: &mut MemoryTx, id: Uuid) -> StoreResult<Option<LoanOffer>> {
        Ok(tx.working.loan_offers.get(&id).cloned())
    }

    async fn update_loan_offer(&self, tx: &mut MemoryTx, offer: &LoanOffer) -> StoreResult<()> {
        tx.working.loan_offers.insert(offer.id, offer.clone());
        Ok(())
    }
}

#[async_trait]
impl ConditionPrecedentRepository for MemoryStore {
    async fn insert_condition_precedent(
        &self,
        tx: &mut MemoryTx,
        cp: &ConditionPrecedent,
    ) -> StoreResult<()> {
        if tx
            .working
            .condition_precedents
            .values()
            .any(|c| c.application_id == cp.application_id)
        {
            return Err(StoreError::Duplicate("condition precedent".to_string()));
        }
        tx.working.condition_precedents.insert(cp.id, cp.clone());
        Ok(())
    }

    async fn find_condition_precedent(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>> {
        Ok(tx.working.condition_precedents.get(&id).cloned())
    }

    async fn find_condition_precedent_by_application(
        &self,
        tx: &mut MemoryTx,
        application_id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>> {
        Ok(tx
            .working
            .condition_precedents
            .values()
            .find(|c| c.application_id == application_id)
            .cloned())
    }

    async fn set_condition_precedent_status(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        status: ConditionPrecedentStatus,
    ) -> StoreResult<()> {
        if let Some(cp) = tx.working.condition_precedents.get_mut(&id) {
            cp.status = status;
            cp.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_unoriginated_condition_precedents(
        &self,
        tx: &mut MemoryTx,
    ) -> StoreResult<Vec<ConditionPrecedent>> {
        let state = &tx.working;
        Ok(state
            .condition_precedents
            .values()
            .filter(|c| c.status == ConditionPrecedentStatus::Pending)
            .filter(|c| !state.loans.values().any(|l| l.application_id == c.application_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LoanRepository for MemoryStore {
    async fn insert_loan(&self, tx: &mut MemoryTx, loan: &Loan) -> StoreResult<()> {
        if tx
            .working
            .loans
            .values()
            .any(|l| l.application_id == loan.application_id)
        {
            return Err(StoreError::Duplicate("loan".to_string()));
        }
        tx.working.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn find_loan(&self, tx: &mut MemoryTx, id: Uuid) -> StoreResult<Option<Loan>> {
        Ok(tx.working.loans.get(&id).cloned())
    }

    async fn find_loan_by_application(
        &self,
        tx: &mut MemoryTx,
        application_id: Uuid,
    ) -> StoreResult<Option<Loan>> {
        Ok(tx
            .working
            .loans
            .values()
            .find(|l| l.application_id == application_id)
            .cloned())
    }

    async fn update_loan(&self, tx: &mut MemoryTx, loan: &Loan) -> StoreResult<()> {
        tx.working.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn list_loans_for_user(&self, tx: &mut MemoryTx, user_id: Uuid) -> StoreResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = tx
            .working
            .loans
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.created_at);
        Ok(loans)
    }
}

#[async_trait]
impl LoanRepaymentScheduleRepository for MemoryStore {
    async fn insert_schedule(
        &self,
        tx: &mut MemoryTx,
        entries: &[RepaymentScheduleEntry],
    ) -> StoreResult<()> {
        for entry in entries {
            let exists = tx.working.repayments.iter().any(|r| {
                r.loan_id == entry.loan_id && r.payment_number == entry.payment_number
            });
            if exists {
                return Err(StoreError::Duplicate("repayment schedule entry".to_string()));
            }
            tx.working.repayments.push(entry.clone());
        }
        Ok(())
    }

    async fn list_schedule(
        &self,
        tx: &mut MemoryTx,
        loan_id: Uuid,
    ) -> StoreResult<Vec<RepaymentScheduleEntry>> {
        let mut entries: Vec<RepaymentScheduleEntry> = tx
            .working
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect();
        entries.sort_by_key(|r| r.payment_number);
        Ok(entries)
    }

    async fn find_repayment(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
    ) -> StoreResult<Option<RepaymentScheduleEntry>> {
        Ok(tx.working.repayments.iter().find(|r| r.id == id).cloned())
    }

    async fn list_past_due_repayments(
        &self,
        tx: &mut MemoryTx,
        today: NaiveDate,
    ) -> StoreResult<Vec<RepaymentScheduleEntry>> {
        Ok(tx
            .working
            .repayments
            .iter()
            .filter(|r| r.is_overdue_on(today))
            .cloned()
            .collect())
    }

    async fn mark_repayment_overdue(&self, tx: &mut MemoryTx, id: Uuid) -> StoreResult<bool> {
        match tx
            .working
            .repayments
            .iter_mut()
            .find(|r| r.id == id && r.status == RepaymentStatus::Pending)
        {
            Some(entry) => {
                entry.status = RepaymentStatus::Overdue;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_repayment_paid(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        paid_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        match tx
            .working
            .repayments
            .iter_mut()
            .find(|r| r.id == id && r.status != RepaymentStatus::Paid)
        {
            Some(entry) => {
                entry.status = RepaymentStatus::Paid;
                entry.paid_at = Some(paid_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ApplicationStage, FinancingType};

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let app = Application::new(Uuid::new_v4(), Uuid::new_v4(), FinancingType::Outright, None);

        {
            let mut tx = store.begin().await.unwrap();
            store.insert_application(&mut tx, &app).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(store.find_application(&mut tx, app.id).await.unwrap().is_none());

        store.insert_application(&mut tx, &app).await.unwrap();
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(store.find_application(&mut tx, app.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_stage_append_is_noop() {
        let store = MemoryStore::new();
        let entry = ApplicationStageEntry::new(
            Uuid::new_v4(),
            ApplicationStage::OfferLetterRequested,
            Uuid::new_v4(),
        );

        let mut tx = store.begin().await.unwrap();
        assert!(store.append_stage(&mut tx, &entry).await.unwrap());

        let again = ApplicationStageEntry::new(entry.application_id, entry.stage, entry.actor_id);
        assert!(!store.append_stage(&mut tx, &again).await.unwrap());
        assert_eq!(store.list_stages(&mut tx, entry.application_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_configuration() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let internal = store.find_internal_organization(&mut tx).await.unwrap().unwrap();
        assert_eq!(internal.id, INTERNAL_ORGANIZATION_ID);

        let stages = store
            .list_review_stages(&mut tx, "Escrow Meeting Request")
            .await
            .unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].organization_type, OrganizationType::Internal);
        assert_eq!(stages[1].organization_type, OrganizationType::Developer);
    }
}
