//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::*;
use crate::loan::RepaymentStatus;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps a unique-constraint violation to `StoreError::Duplicate`
fn unique(what: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

type PgTx = Transaction<'static, Postgres>;

/// Nine binds per schedule row
const SCHEDULE_INSERT_CHUNK: usize = 1000;

#[async_trait]
impl Database for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> StoreResult<()> {
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryRepository for PgStore {
    async fn find_property(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Property>> {
        let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(property)
    }

    async fn find_organization(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(org)
    }

    async fn find_internal_organization(&self, tx: &mut PgTx) -> StoreResult<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE organization_type = 'internal'",
        )
        .fetch_optional(&mut **tx)
        .await?;
        Ok(org)
    }
}

#[async_trait]
impl ApplicationRepository for PgStore {
    async fn insert_application(&self, tx: &mut PgTx, app: &Application) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (
                id, user_id, property_id, financing_type, status,
                offer_letter_id, property_closing_id, escrow_information_id, escrow_status_id,
                eligibility_id, dip_id, loan_offer_id, condition_precedent_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(app.id)
        .bind(app.user_id)
        .bind(app.property_id)
        .bind(app.financing_type)
        .bind(app.status)
        .bind(app.offer_letter_id)
        .bind(app.property_closing_id)
        .bind(app.escrow_information_id)
        .bind(app.escrow_status_id)
        .bind(app.eligibility_id)
        .bind(app.dip_id)
        .bind(app.loan_offer_id)
        .bind(app.condition_precedent_id)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("application"))?;
        Ok(())
    }

    async fn find_application(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Application>> {
        // Every transition is read-modify-write of the whole row
        let app = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(app)
    }

    async fn update_application(&self, tx: &mut PgTx, app: &Application) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE applications SET
                status = $2, offer_letter_id = $3, property_closing_id = $4,
                escrow_information_id = $5, escrow_status_id = $6, eligibility_id = $7,
                dip_id = $8, loan_offer_id = $9, condition_precedent_id = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(app.id)
        .bind(app.status)
        .bind(app.offer_letter_id)
        .bind(app.property_closing_id)
        .bind(app.escrow_information_id)
        .bind(app.escrow_status_id)
        .bind(app.eligibility_id)
        .bind(app.dip_id)
        .bind(app.loan_offer_id)
        .bind(app.condition_precedent_id)
        .bind(app.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn list_applications_for_user(
        &self,
        tx: &mut PgTx,
        user_id: Uuid,
    ) -> StoreResult<Vec<Application>> {
        let apps = sqlx::query_as::<_, Application>(
            "SELECT * FROM applications WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(apps)
    }

    async fn append_stage(&self, tx: &mut PgTx, entry: &ApplicationStageEntry) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO application_stages (id, application_id, stage, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (application_id, stage, actor_id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.application_id)
        .bind(entry.stage)
        .bind(entry.actor_id)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_stages(
        &self,
        tx: &mut PgTx,
        application_id: Uuid,
    ) -> StoreResult<Vec<ApplicationStageEntry>> {
        let stages = sqlx::query_as::<_, ApplicationStageEntry>(
            "SELECT * FROM application_stages WHERE application_id = $1 ORDER BY created_at",
        )
        .bind(application_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(stages)
    }
}

#[async_trait]
impl ReviewRequestRepository for PgStore {
    async fn insert_review_request(&self, tx: &mut PgTx, request: &ReviewRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO review_requests (
                id, initiator_id, request_type, status, candidate_name, submitted_at, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id)
        .bind(request.initiator_id)
        .bind(&request.request_type)
        .bind(request.status)
        .bind(&request.candidate_name)
        .bind(request.submitted_at)
        .bind(request.resolved_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_review_request(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<ReviewRequest>> {
        let request =
            sqlx::query_as::<_, ReviewRequest>("SELECT * FROM review_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(request)
    }

    async fn finish_review_request(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        status: DecisionStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE review_requests SET status = $2, resolved_at = $3 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(status)
        .bind(resolved_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_review_stages(&self, tx: &mut PgTx, request_type: &str) -> StoreResult<Vec<ReviewStage>> {
        let stages = sqlx::query_as::<_, ReviewStage>(
            "SELECT * FROM review_request_stages WHERE request_type = $1 ORDER BY stage_order",
        )
        .bind(request_type)
        .fetch_all(&mut **tx)
        .await?;
        Ok(stages)
    }

    async fn insert_approval(&self, tx: &mut PgTx, approval: &ReviewApproval) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO review_request_approvals (
                id, review_request_id, stage_id, organization_id, status,
                approver_id, decided_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(approval.id)
        .bind(approval.review_request_id)
        .bind(approval.stage_id)
        .bind(approval.organization_id)
        .bind(approval.status)
        .bind(approval.approver_id)
        .bind(approval.decided_at)
        .bind(approval.created_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("review approval"))?;
        Ok(())
    }

    async fn find_approval(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<ReviewApproval>> {
        let approval = sqlx::query_as::<_, ReviewApproval>(
            "SELECT * FROM review_request_approvals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(approval)
    }

    async fn decide_approval(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        status: DecisionStatus,
        approver_id: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE review_request_approvals
            SET status = $2, approver_id = $3, decided_at = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(approver_id)
        .bind(decided_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_approvals(
        &self,
        tx: &mut PgTx,
        review_request_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>> {
        let approvals = sqlx::query_as::<_, ReviewApproval>(
            "SELECT * FROM review_request_approvals WHERE review_request_id = $1 ORDER BY created_at",
        )
        .bind(review_request_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(approvals)
    }

    async fn list_pending_approvals(
        &self,
        tx: &mut PgTx,
        organization_id: Uuid,
    ) -> StoreResult<Vec<ReviewApproval>> {
        let approvals = sqlx::query_as::<_, ReviewApproval>(
            r#"
            SELECT * FROM review_request_approvals
            WHERE organization_id = $1 AND status = 'pending'
            ORDER BY created_at
            "#,
        )
        .bind(organization_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(approvals)
    }
}

#[async_trait]
impl OfferLetterRepository for PgStore {
    async fn insert_offer_letter(&self, tx: &mut PgTx, letter: &OfferLetter) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO offer_letters (id, application_id, review_request_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(letter.id)
        .bind(letter.application_id)
        .bind(letter.review_request_id)
        .bind(letter.status)
        .bind(letter.created_at)
        .bind(letter.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("offer letter"))?;
        Ok(())
    }

    async fn find_offer_letter(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<OfferLetter>> {
        let letter = sqlx::query_as::<_, OfferLetter>("SELECT * FROM offer_letters WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(letter)
    }

    async fn find_offer_letter_by_review(
        &self,
        tx: &mut PgTx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<OfferLetter>> {
        let letter = sqlx::query_as::<_, OfferLetter>(
            "SELECT * FROM offer_letters WHERE review_request_id = $1",
        )
        .bind(review_request_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(letter)
    }

    async fn set_offer_letter_status(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        status: DecisionStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE offer_letters SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClosingRepository for PgStore {
    async fn insert_closing(&self, tx: &mut PgTx, closing: &PropertyClosing) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO property_closings (id, application_id, status, decided_by, decided_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(closing.id)
        .bind(closing.application_id)
        .bind(closing.status)
        .bind(closing.decided_by)
        .bind(closing.decided_at)
        .bind(closing.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_closing(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<PropertyClosing>> {
        let closing =
            sqlx::query_as::<_, PropertyClosing>("SELECT * FROM property_closings WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(closing)
    }

    async fn decide_closing(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        status: DecisionStatus,
        decided_by: Uuid,
        decided_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE property_closings
            SET status = $2, decided_by = $3, decided_at = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(decided_by)
        .bind(decided_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl EscrowRepository for PgStore {
    async fn insert_escrow_status(&self, tx: &mut PgTx, status: &EscrowStatus) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escrow_statuses (id, application_id, review_request_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(status.id)
        .bind(status.application_id)
        .bind(status.review_request_id)
        .bind(status.status)
        .bind(status.created_at)
        .bind(status.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("escrow status"))?;
        Ok(())
    }

    async fn find_escrow_status(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<EscrowStatus>> {
        let status = sqlx::query_as::<_, EscrowStatus>("SELECT * FROM escrow_statuses WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(status)
    }

    async fn find_escrow_status_by_review(
        &self,
        tx: &mut PgTx,
        review_request_id: Uuid,
    ) -> StoreResult<Option<EscrowStatus>> {
        let status = sqlx::query_as::<_, EscrowStatus>(
            "SELECT * FROM escrow_statuses WHERE review_request_id = $1",
        )
        .bind(review_request_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(status)
    }

    async fn transition_escrow_status(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        from: EscrowMeetingStatus,
        to: EscrowMeetingStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE escrow_statuses SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_escrow_information(&self, tx: &mut PgTx, info: &EscrowInformation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escrow_informations (
                id, application_id, escrow_status_id, meeting_at, location, attendees, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(info.id)
        .bind(info.application_id)
        .bind(info.escrow_status_id)
        .bind(info.meeting_at)
        .bind(&info.location)
        .bind(&info.attendees)
        .bind(info.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_escrow_information(
        &self,
        tx: &mut PgTx,
        id: Uuid,
    ) -> StoreResult<Option<EscrowInformation>> {
        let info = sqlx::query_as::<_, EscrowInformation>(
            "SELECT * FROM escrow_informations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(info)
    }
}

#[async_trait]
impl EligibilityRepository for PgStore {
    async fn insert_eligibility(&self, tx: &mut PgTx, eligibility: &Eligibility) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eligibilities (
                id, application_id, user_id, lender_organization_id, requested_amount,
                monthly_income, term_months, repayment_frequency, interest_rate, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(eligibility.id)
        .bind(eligibility.application_id)
        .bind(eligibility.user_id)
        .bind(eligibility.lender_organization_id)
        .bind(eligibility.requested_amount)
        .bind(eligibility.monthly_income)
        .bind(eligibility.term_months)
        .bind(eligibility.repayment_frequency)
        .bind(eligibility.interest_rate)
        .bind(eligibility.status)
        .bind(eligibility.created_at)
        .bind(eligibility.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_eligibility(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Eligibility>> {
        let eligibility =
            sqlx::query_as::<_, Eligibility>("SELECT * FROM eligibilities WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(eligibility)
    }

    async fn update_eligibility(&self, tx: &mut PgTx, eligibility: &Eligibility) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE eligibilities
            SET application_id = $2, interest_rate = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(eligibility.id)
        .bind(eligibility.application_id)
        .bind(eligibility.interest_rate)
        .bind(eligibility.status)
        .bind(eligibility.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DipRepository for PgStore {
    async fn insert_dip(&self, tx: &mut PgTx, dip: &Dip) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dips (
                id, application_id, eligibility_id, lender_status, user_status, status,
                principal, interest_rate, term_months, repayment_frequency,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(dip.id)
        .bind(dip.application_id)
        .bind(dip.eligibility_id)
        .bind(dip.lender_status)
        .bind(dip.user_status)
        .bind(dip.status)
        .bind(dip.principal)
        .bind(dip.interest_rate)
        .bind(dip.term_months)
        .bind(dip.repayment_frequency)
        .bind(dip.created_at)
        .bind(dip.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("dip"))?;
        Ok(())
    }

    async fn find_dip(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Dip>> {
        let dip = sqlx::query_as::<_, Dip>("SELECT * FROM dips WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(dip)
    }

    async fn find_dip_by_eligibility(&self, tx: &mut PgTx, eligibility_id: Uuid) -> StoreResult<Option<Dip>> {
        let dip = sqlx::query_as::<_, Dip>("SELECT * FROM dips WHERE eligibility_id = $1")
            .bind(eligibility_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(dip)
    }

    async fn update_dip(&self, tx: &mut PgTx, dip: &Dip) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE dips
            SET lender_status = $2, user_status = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(dip.id)
        .bind(dip.lender_status)
        .bind(dip.user_status)
        .bind(dip.status)
        .bind(dip.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn list_eligibilities_awaiting_dip(&self, tx: &mut PgTx) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT a.eligibility_id FROM applications a
            JOIN offer_letters ol ON ol.id = a.offer_letter_id
            WHERE a.financing_type = 'mortgage'
              AND a.status = 'processing'
              AND a.dip_id IS NULL
              AND a.eligibility_id IS NOT NULL
              AND ol.status = 'approved'
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl LoanOfferRepository for PgStore {
    async fn insert_loan_offer(&self, tx: &mut PgTx, offer: &LoanOffer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_offers (
                id, application_id, dip_id, principal, interest_rate, term_months,
                repayment_frequency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(offer.id)
        .bind(offer.application_id)
        .bind(offer.dip_id)
        .bind(offer.principal)
        .bind(offer.interest_rate)
        .bind(offer.term_months)
        .bind(offer.repayment_frequency)
        .bind(offer.status)
        .bind(offer.created_at)
        .bind(offer.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_loan_offer(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<LoanOffer>> {
        let offer = sqlx::query_as::<_, LoanOffer>("SELECT * FROM loan_offers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(offer)
    }

    async fn update_loan_offer(&self, tx: &mut PgTx, offer: &LoanOffer) -> StoreResult<()> {
        sqlx::query("UPDATE loan_offers SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(offer.id)
            .bind(offer.status)
            .bind(offer.updated_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConditionPrecedentRepository for PgStore {
    async fn insert_condition_precedent(&self, tx: &mut PgTx, cp: &ConditionPrecedent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO condition_precedents (id, application_id, loan_offer_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cp.id)
        .bind(cp.application_id)
        .bind(cp.loan_offer_id)
        .bind(cp.status)
        .bind(cp.created_at)
        .bind(cp.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("condition precedent"))?;
        Ok(())
    }

    async fn find_condition_precedent(
        &self,
        tx: &mut PgTx,
        id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>> {
        let cp = sqlx::query_as::<_, ConditionPrecedent>(
            "SELECT * FROM condition_precedents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(cp)
    }

    async fn find_condition_precedent_by_application(
        &self,
        tx: &mut PgTx,
        application_id: Uuid,
    ) -> StoreResult<Option<ConditionPrecedent>> {
        let cp = sqlx::query_as::<_, ConditionPrecedent>(
            "SELECT * FROM condition_precedents WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(cp)
    }

    async fn set_condition_precedent_status(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        status: ConditionPrecedentStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE condition_precedents SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list_unoriginated_condition_precedents(
        &self,
        tx: &mut PgTx,
    ) -> StoreResult<Vec<ConditionPrecedent>> {
        let cps = sqlx::query_as::<_, ConditionPrecedent>(
            r#"
            SELECT cp.* FROM condition_precedents cp
            LEFT JOIN loans l ON l.application_id = cp.application_id
            WHERE cp.status = 'pending' AND l.id IS NULL
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;
        Ok(cps)
    }
}

#[async_trait]
impl LoanRepository for PgStore {
    async fn insert_loan(&self, tx: &mut PgTx, loan: &Loan) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id, application_id, loan_offer_id, user_id, principal, interest_rate,
                repayment_frequency, term_months, start_date, end_date, remaining_balance,
                total_interest_paid, total_principal_paid, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(loan.id)
        .bind(loan.application_id)
        .bind(loan.loan_offer_id)
        .bind(loan.user_id)
        .bind(loan.principal)
        .bind(loan.interest_rate)
        .bind(loan.repayment_frequency)
        .bind(loan.term_months)
        .bind(loan.start_date)
        .bind(loan.end_date)
        .bind(loan.remaining_balance)
        .bind(loan.total_interest_paid)
        .bind(loan.total_principal_paid)
        .bind(loan.status)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(unique("loan"))?;
        Ok(())
    }

    async fn find_loan(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(loan)
    }

    async fn find_loan_by_application(&self, tx: &mut PgTx, application_id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE application_id = $1")
            .bind(application_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(loan)
    }

    async fn update_loan(&self, tx: &mut PgTx, loan: &Loan) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE loans SET
                remaining_balance = $2, total_interest_paid = $3, total_principal_paid = $4,
                status = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(loan.remaining_balance)
        .bind(loan.total_interest_paid)
        .bind(loan.total_principal_paid)
        .bind(loan.status)
        .bind(loan.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn list_loans_for_user(&self, tx: &mut PgTx, user_id: Uuid) -> StoreResult<Vec<Loan>> {
        let loans =
            sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE user_id = $1 ORDER BY created_at")
                .bind(user_id)
                .fetch_all(&mut **tx)
                .await?;
        Ok(loans)
    }
}

#[async_trait]
impl LoanRepaymentScheduleRepository for PgStore {
    async fn insert_schedule(&self, tx: &mut PgTx, entries: &[RepaymentScheduleEntry]) -> StoreResult<()> {
        // A statement carries at most u16::MAX binds
        for chunk in entries.chunks(SCHEDULE_INSERT_CHUNK) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO loan_repayment_schedules (id, loan_id, payment_number, due_date, \
                 principal_due, interest_due, total_due, status, paid_at) ",
            );
            builder.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.id)
                    .push_bind(entry.loan_id)
                    .push_bind(entry.payment_number)
                    .push_bind(entry.due_date)
                    .push_bind(entry.principal_due)
                    .push_bind(entry.interest_due)
                    .push_bind(entry.total_due)
                    .push_bind(entry.status)
                    .push_bind(entry.paid_at);
            });

            builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(unique("repayment schedule entry"))?;
        }
        Ok(())
    }

    async fn list_schedule(&self, tx: &mut PgTx, loan_id: Uuid) -> StoreResult<Vec<RepaymentScheduleEntry>> {
        let entries = sqlx::query_as::<_, RepaymentScheduleEntry>(
            "SELECT * FROM loan_repayment_schedules WHERE loan_id = $1 ORDER BY payment_number",
        )
        .bind(loan_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(entries)
    }

    async fn find_repayment(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<Option<RepaymentScheduleEntry>> {
        let entry = sqlx::query_as::<_, RepaymentScheduleEntry>(
            "SELECT * FROM loan_repayment_schedules WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(entry)
    }

    async fn list_past_due_repayments(
        &self,
        tx: &mut PgTx,
        today: NaiveDate,
    ) -> StoreResult<Vec<RepaymentScheduleEntry>> {
        let entries = sqlx::query_as::<_, RepaymentScheduleEntry>(
            r#"
            SELECT * FROM loan_repayment_schedules
            WHERE status = $1 AND due_date < $2
            ORDER BY due_date
            "#,
        )
        .bind(RepaymentStatus::Pending)
        .bind(today)
        .fetch_all(&mut **tx)
        .await?;
        Ok(entries)
    }

    async fn mark_repayment_overdue(&self, tx: &mut PgTx, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE loan_repayment_schedules SET status = $2 WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(RepaymentStatus::Overdue)
        .bind(RepaymentStatus::Pending)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_repayment_paid(&self, tx: &mut PgTx, id: Uuid, paid_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE loan_repayment_schedules SET status = $2, paid_at = $3 WHERE id = $1 AND status <> $2",
        )
        .bind(id)
        .bind(RepaymentStatus::Paid)
        .bind(paid_at)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
