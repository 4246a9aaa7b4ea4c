//! DIP lifecycle manager
//!
//! Lender and borrower decide independently; the DIP status is derived from
//! both decisions. Payment callbacks may be redelivered, so the fee-driven
//! transitions accept a repeat as a no-op.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::amortization::normalize_rate;
use crate::application::service::{append_stage, ensure_open, ensure_owner, load_application};
use crate::application::{Application, ApplicationStage, ApplicationStatus};
use crate::dip::{
    ConditionPrecedent, ConditionPrecedentStatus, Dip, DipStatus, Eligibility,
    EligibilityReviewRequest, LenderDecision, LoanOffer, LoanOfferStatus, SubmitEligibilityRequest,
    UserDecision,
};
use crate::error::{AppError, AppResult};
use crate::jobs::{ConditionPrecedentJob, EligibilityJob, JobPayload, JobSink};
use crate::models::{Actor, DecisionStatus, OrganizationType};
use crate::notifications::{self, Activity, ActivityLog, Notification, Notifier, Recipient};
use crate::repository::{Store, StoreError};

pub struct DipService<S: Store> {
    store: Arc<S>,
    jobs: Arc<dyn JobSink>,
    notifier: Arc<dyn Notifier>,
    activity: Arc<dyn ActivityLog>,
}

impl<S: Store> Clone for DipService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            jobs: self.jobs.clone(),
            notifier: self.notifier.clone(),
            activity: self.activity.clone(),
        }
    }
}

async fn load_dip<S: Store>(store: &S, tx: &mut S::Tx, id: Uuid) -> AppResult<Dip> {
    store
        .find_dip(tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("DIP", id))
}

async fn load_eligibility<S: Store>(store: &S, tx: &mut S::Tx, id: Uuid) -> AppResult<Eligibility> {
    store
        .find_eligibility(tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Eligibility", id))
}

/// Lender organization behind an application's DIP
async fn lender_of<S: Store>(store: &S, tx: &mut S::Tx, dip: &Dip) -> AppResult<Uuid> {
    Ok(load_eligibility(store, tx, dip.eligibility_id)
        .await?
        .lender_organization_id)
}

fn ensure_lender(actor: &Actor, lender_organization_id: Uuid) -> AppResult<()> {
    if !actor.acts_for(lender_organization_id) {
        return Err(AppError::Forbidden(
            "Only the lender can perform this action".to_string(),
        ));
    }
    Ok(())
}

impl<S: Store> DipService<S> {
    pub fn new(
        store: Arc<S>,
        jobs: Arc<dyn JobSink>,
        notifier: Arc<dyn Notifier>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            jobs,
            notifier,
            activity,
        }
    }

    async fn notify(&self, notification: Notification) {
        notifications::send(self.notifier.as_ref(), notification).await;
    }

    pub async fn submit_eligibility(
        &self,
        actor: &Actor,
        request: SubmitEligibilityRequest,
    ) -> AppResult<Eligibility> {
        request.validate()?;
        request.validate_amounts().map_err(AppError::Invalid)?;

        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let lender = store
            .find_organization(&mut tx, request.lender_organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("Organization", request.lender_organization_id))?;
        if lender.organization_type != OrganizationType::Lender {
            return Err(AppError::Invalid(format!("{} is not a lender", lender.name)));
        }

        let now = Utc::now();
        let eligibility = Eligibility {
            id: Uuid::new_v4(),
            application_id: None,
            user_id: actor.user_id,
            lender_organization_id: lender.id,
            requested_amount: request.requested_amount,
            monthly_income: request.monthly_income,
            term_months: request.term_months,
            repayment_frequency: request.repayment_frequency,
            interest_rate: None,
            status: DecisionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        store.insert_eligibility(&mut tx, &eligibility).await?;
        store.commit(tx).await?;

        tracing::info!(
            eligibility_id = %eligibility.id,
            lender_organization_id = %lender.id,
            "Eligibility submitted"
        );
        self.notify(
            Notification::new("eligibility_submitted", Recipient::Organization(lender.id))
                .with("eligibility_id", eligibility.id),
        )
        .await;

        Ok(eligibility)
    }

    pub async fn review_eligibility(
        &self,
        actor: &Actor,
        eligibility_id: Uuid,
        review: EligibilityReviewRequest,
    ) -> AppResult<Eligibility> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut eligibility = load_eligibility(store, &mut tx, eligibility_id).await?;
        ensure_lender(actor, eligibility.lender_organization_id)?;
        if eligibility.status != DecisionStatus::Pending {
            return Err(AppError::Conflict(
                "This eligibility has already been reviewed".to_string(),
            ));
        }

        if review.approve {
            let rate = review.interest_rate.map(normalize_rate).ok_or_else(|| {
                AppError::Invalid("An interest rate is required to approve".to_string())
            })?;
            if rate < Decimal::ZERO {
                return Err(AppError::Invalid("Interest rate must not be negative".to_string()));
            }
            eligibility.interest_rate = Some(rate);
            eligibility.status = DecisionStatus::Approved;
        } else {
            eligibility.status = DecisionStatus::Rejected;
        }
        eligibility.updated_at = Utc::now();

        store.update_eligibility(&mut tx, &eligibility).await?;
        store.commit(tx).await?;

        tracing::info!(
            eligibility_id = %eligibility.id,
            status = ?eligibility.status,
            "Eligibility reviewed"
        );
        self.notify(
            Notification::new(
                if review.approve {
                    "eligibility_approved"
                } else {
                    "eligibility_rejected"
                },
                Recipient::User(eligibility.user_id),
            )
            .with("eligibility_id", eligibility.id),
        )
        .await;

        Ok(eligibility)
    }

    pub async fn get_eligibility(&self, actor: &Actor, eligibility_id: Uuid) -> AppResult<Eligibility> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let eligibility = load_eligibility(store, &mut tx, eligibility_id).await?;
        if eligibility.user_id != actor.user_id && !actor.acts_for(eligibility.lender_organization_id) {
            return Err(AppError::not_found("Eligibility", eligibility_id));
        }
        Ok(eligibility)
    }

    /// Issue the DIP for an approved, attached eligibility. Runs as a job;
    /// a repeat returns the DIP already issued.
    pub async fn generate_dip(&self, eligibility_id: Uuid) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        if let Some(existing) = store.find_dip_by_eligibility(&mut tx, eligibility_id).await? {
            tracing::info!(eligibility_id = %eligibility_id, dip_id = %existing.id, "DIP already generated");
            return Ok(existing);
        }

        let eligibility = load_eligibility(store, &mut tx, eligibility_id).await?;
        if eligibility.status != DecisionStatus::Approved {
            return Err(AppError::Invalid("Eligibility is not approved".to_string()));
        }
        let application_id = eligibility.application_id.ok_or_else(|| {
            AppError::Invalid("Eligibility is not attached to an application".to_string())
        })?;
        let interest_rate = eligibility
            .interest_rate
            .ok_or_else(|| AppError::Invalid("Eligibility has no interest rate".to_string()))?;

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;

        let now = Utc::now();
        let dip = Dip {
            id: Uuid::new_v4(),
            application_id,
            eligibility_id,
            lender_status: None,
            user_status: None,
            status: DipStatus::Generated,
            principal: eligibility.requested_amount,
            interest_rate,
            term_months: eligibility.term_months,
            repayment_frequency: eligibility.repayment_frequency,
            created_at: now,
            updated_at: now,
        };

        match store.insert_dip(&mut tx, &dip).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                drop(tx);
                let mut tx = store.begin().await?;
                return store
                    .find_dip_by_eligibility(&mut tx, eligibility_id)
                    .await?
                    .ok_or_else(|| AppError::Internal("DIP vanished after conflict".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        app.dip_id = Some(dip.id);
        app.updated_at = now;
        store.update_application(&mut tx, &app).await?;
        store.commit(tx).await?;

        tracing::info!(
            application_id = %application_id,
            dip_id = %dip.id,
            principal = %dip.principal,
            "DIP generated"
        );
        self.notify(
            Notification::new("dip_generated", Recipient::Organization(eligibility.lender_organization_id))
                .with("application_id", application_id)
                .with("dip_id", dip.id),
        )
        .await;

        Ok(dip)
    }

    /// Re-enqueue DIP generation for approved mortgage applications that
    /// never got one, e.g. after a restart dropped the queued job
    pub async fn requeue_missing_dips(&self) -> AppResult<usize> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        let pending = store.list_eligibilities_awaiting_dip(&mut tx).await?;
        drop(tx);

        for eligibility_id in &pending {
            self.jobs
                .enqueue(JobPayload::GenerateDip(EligibilityJob {
                    eligibility_id: *eligibility_id,
                }))
                .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Re-enqueued missing DIPs");
        }
        Ok(pending.len())
    }

    pub async fn get_dip(&self, actor: &Actor, dip_id: Uuid) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let dip = load_dip(store, &mut tx, dip_id).await?;
        let app = load_application(store, &mut tx, dip.application_id).await?;
        let lender = lender_of(store, &mut tx, &dip).await?;
        if app.user_id != actor.user_id && !actor.acts_for(lender) {
            return Err(AppError::not_found("DIP", dip_id));
        }
        Ok(dip)
    }

    pub async fn lender_respond(&self, actor: &Actor, dip_id: Uuid, accept: bool) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut dip = load_dip(store, &mut tx, dip_id).await?;
        let mut app = load_application(store, &mut tx, dip.application_id).await?;
        ensure_open(&app)?;
        ensure_lender(actor, lender_of(store, &mut tx, &dip).await?)?;

        let decision = LenderDecision::from_accept(accept);
        if dip.lender_status == Some(decision) {
            return Err(AppError::Conflict(format!(
                "DIP has already been {}",
                if accept { "accepted" } else { "rejected" }
            )));
        }
        if !dip.status.open_to_lender() || dip.user_status.is_some() {
            return Err(AppError::Forbidden(
                "The borrower has already responded to this DIP".to_string(),
            ));
        }

        dip.lender_status = Some(decision);
        dip.set_status(DipStatus::from_decisions(dip.lender_status, dip.user_status));
        store.update_dip(&mut tx, &dip).await?;

        if dip.status == DipStatus::Rejected {
            app.set_status(ApplicationStatus::Rejected);
            store.update_application(&mut tx, &app).await?;
        }

        store.commit(tx).await?;

        tracing::info!(dip_id = %dip.id, decision = ?decision, status = ?dip.status, "Lender responded to DIP");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "dip_lender_responded"));
        self.notify(
            Notification::new(
                if accept { "dip_awaiting_acceptance" } else { "dip_rejected" },
                Recipient::User(app.user_id),
            )
            .with("application_id", app.id)
            .with("dip_id", dip.id),
        )
        .await;

        Ok(dip)
    }

    pub async fn user_respond(&self, actor: &Actor, dip_id: Uuid, accept: bool) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut dip = load_dip(store, &mut tx, dip_id).await?;
        let mut app = load_application(store, &mut tx, dip.application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        let decision = UserDecision::from_accept(accept);
        if dip.user_status == Some(decision) {
            return Err(AppError::Conflict(format!(
                "You have already {} this DIP",
                if accept { "accepted" } else { "rejected" }
            )));
        }
        if dip.status != DipStatus::AwaitingUserAction {
            return Err(AppError::Forbidden(
                "This DIP is not awaiting your response".to_string(),
            ));
        }

        dip.user_status = Some(decision);
        dip.set_status(DipStatus::from_decisions(dip.lender_status, dip.user_status));
        store.update_dip(&mut tx, &dip).await?;

        match decision {
            UserDecision::Accept => {
                append_stage(store, &mut tx, app.id, ApplicationStage::DipAccepted, actor.user_id)
                    .await?;
            }
            UserDecision::Reject => {
                app.set_status(ApplicationStatus::Rejected);
                store.update_application(&mut tx, &app).await?;
            }
        }

        let lender = lender_of(store, &mut tx, &dip).await?;
        store.commit(tx).await?;

        tracing::info!(dip_id = %dip.id, decision = ?decision, status = ?dip.status, "Borrower responded to DIP");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "dip_user_responded"));
        self.notify(
            Notification::new(
                if accept { "dip_accepted" } else { "dip_declined" },
                Recipient::Organization(lender),
            )
            .with("application_id", app.id)
            .with("dip_id", dip.id),
        )
        .await;

        Ok(dip)
    }

    /// Due-diligence fee received for an application's DIP
    pub async fn mark_due_diligence_paid(&self, application_id: Uuid) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        let dip_id = app
            .dip_id
            .ok_or_else(|| AppError::NotFound("No DIP for this application".to_string()))?;
        let mut dip = load_dip(store, &mut tx, dip_id).await?;

        match dip.status {
            DipStatus::PaymentPending => {}
            DipStatus::DocumentsPending | DipStatus::DocumentReviewing | DipStatus::Completed => {
                tracing::info!(dip_id = %dip.id, "Due diligence already recorded");
                return Ok(dip);
            }
            _ => {
                return Err(AppError::Forbidden(
                    "This DIP is not awaiting a due diligence payment".to_string(),
                ))
            }
        }

        dip.set_status(DipStatus::DocumentsPending);
        store.update_dip(&mut tx, &dip).await?;
        append_stage(
            store,
            &mut tx,
            app.id,
            ApplicationStage::DueDiligencePaid,
            app.user_id,
        )
        .await?;
        store.commit(tx).await?;

        tracing::info!(application_id = %app.id, dip_id = %dip.id, "Due diligence paid");
        self.notify(
            Notification::new("due_diligence_received", Recipient::User(app.user_id))
                .with("application_id", app.id),
        )
        .await;

        Ok(dip)
    }

    pub async fn submit_documents(&self, actor: &Actor, dip_id: Uuid) -> AppResult<Dip> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut dip = load_dip(store, &mut tx, dip_id).await?;
        let app = load_application(store, &mut tx, dip.application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        if dip.status != DipStatus::DocumentsPending {
            return Err(AppError::Forbidden(
                "This DIP is not awaiting documents".to_string(),
            ));
        }
        dip.set_status(DipStatus::DocumentReviewing);
        store.update_dip(&mut tx, &dip).await?;

        let lender = lender_of(store, &mut tx, &dip).await?;
        store.commit(tx).await?;

        tracing::info!(dip_id = %dip.id, "DIP documents submitted");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "dip_documents_submitted"));
        self.notify(
            Notification::new("dip_documents_submitted", Recipient::Organization(lender))
                .with("application_id", app.id)
                .with("dip_id", dip.id),
        )
        .await;

        Ok(dip)
    }

    /// The lender finishes document review and issues a loan offer on the
    /// DIP's terms
    pub async fn complete_review(&self, actor: &Actor, dip_id: Uuid) -> AppResult<LoanOffer> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut dip = load_dip(store, &mut tx, dip_id).await?;
        let mut app = load_application(store, &mut tx, dip.application_id).await?;
        ensure_open(&app)?;
        ensure_lender(actor, lender_of(store, &mut tx, &dip).await?)?;

        if dip.status != DipStatus::DocumentReviewing {
            return Err(AppError::Forbidden(
                "This DIP is not under document review".to_string(),
            ));
        }
        if let Some(offer_id) = app.loan_offer_id {
            if let Some(offer) = store.find_loan_offer(&mut tx, offer_id).await? {
                if offer.status != LoanOfferStatus::Declined {
                    return Err(AppError::Conflict(
                        "A loan offer is already outstanding".to_string(),
                    ));
                }
            }
        }

        dip.set_status(DipStatus::Completed);
        store.update_dip(&mut tx, &dip).await?;

        let now = Utc::now();
        let offer = LoanOffer {
            id: Uuid::new_v4(),
            application_id: app.id,
            dip_id: dip.id,
            principal: dip.principal,
            interest_rate: dip.interest_rate,
            term_months: dip.term_months,
            repayment_frequency: dip.repayment_frequency,
            status: LoanOfferStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        store.insert_loan_offer(&mut tx, &offer).await?;

        app.loan_offer_id = Some(offer.id);
        app.updated_at = now;
        store.update_application(&mut tx, &app).await?;
        store.commit(tx).await?;

        tracing::info!(dip_id = %dip.id, loan_offer_id = %offer.id, "Loan offer issued");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "loan_offer_issued"));
        self.notify(
            Notification::new("loan_offer_issued", Recipient::User(app.user_id))
                .with("application_id", app.id)
                .with("loan_offer_id", offer.id),
        )
        .await;

        Ok(offer)
    }

    pub async fn get_loan_offer(&self, actor: &Actor, offer_id: Uuid) -> AppResult<LoanOffer> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let offer = store
            .find_loan_offer(&mut tx, offer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan offer", offer_id))?;
        let dip = load_dip(store, &mut tx, offer.dip_id).await?;
        let app = load_application(store, &mut tx, offer.application_id).await?;
        let lender = lender_of(store, &mut tx, &dip).await?;
        if app.user_id != actor.user_id && !actor.acts_for(lender) {
            return Err(AppError::not_found("Loan offer", offer_id));
        }
        Ok(offer)
    }

    pub async fn respond_to_loan_offer(
        &self,
        actor: &Actor,
        offer_id: Uuid,
        accept: bool,
    ) -> AppResult<LoanOffer> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut offer = store
            .find_loan_offer(&mut tx, offer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan offer", offer_id))?;
        let mut app = load_application(store, &mut tx, offer.application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        if offer.status != LoanOfferStatus::Pending {
            return Err(AppError::Conflict(
                "This loan offer has already been answered".to_string(),
            ));
        }

        offer.updated_at = Utc::now();
        if accept {
            offer.status = LoanOfferStatus::Accepted;
            append_stage(
                store,
                &mut tx,
                app.id,
                ApplicationStage::LoanOfferAccepted,
                actor.user_id,
            )
            .await?;
        } else {
            offer.status = LoanOfferStatus::Declined;
            app.set_status(ApplicationStatus::Rejected);
            store.update_application(&mut tx, &app).await?;
        }
        store.update_loan_offer(&mut tx, &offer).await?;

        let dip = load_dip(store, &mut tx, offer.dip_id).await?;
        let lender = lender_of(store, &mut tx, &dip).await?;
        store.commit(tx).await?;

        tracing::info!(loan_offer_id = %offer.id, status = ?offer.status, "Loan offer answered");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "loan_offer_answered"));
        self.notify(
            Notification::new(
                if accept { "loan_offer_accepted" } else { "loan_offer_declined" },
                Recipient::Organization(lender),
            )
            .with("application_id", app.id)
            .with("loan_offer_id", offer.id),
        )
        .await;

        Ok(offer)
    }

    /// Management fee received: record the condition precedent and hand the
    /// application to loan origination
    pub async fn record_management_fee(&self, application_id: Uuid) -> AppResult<ConditionPrecedent> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        if let Some(existing) = store
            .find_condition_precedent_by_application(&mut tx, application_id)
            .await?
        {
            drop(tx);
            tracing::info!(
                application_id = %application_id,
                condition_precedent_id = %existing.id,
                "Management fee already recorded"
            );
            if existing.status == ConditionPrecedentStatus::Pending {
                self.enqueue_origination(&existing)?;
            }
            return Ok(existing);
        }

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        let offer = self.accepted_offer(&mut tx, &app).await?;

        let now = Utc::now();
        let cp = ConditionPrecedent {
            id: Uuid::new_v4(),
            application_id,
            loan_offer_id: offer.id,
            status: ConditionPrecedentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        match store.insert_condition_precedent(&mut tx, &cp).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                drop(tx);
                let mut tx = store.begin().await?;
                return store
                    .find_condition_precedent_by_application(&mut tx, application_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("condition precedent vanished after conflict".to_string())
                    });
            }
            Err(e) => return Err(e.into()),
        }

        app.condition_precedent_id = Some(cp.id);
        app.updated_at = now;
        store.update_application(&mut tx, &app).await?;
        append_stage(
            store,
            &mut tx,
            app.id,
            ApplicationStage::ManagementFeePaid,
            app.user_id,
        )
        .await?;
        store.commit(tx).await?;

        tracing::info!(
            application_id = %application_id,
            condition_precedent_id = %cp.id,
            "Condition precedent recorded"
        );
        self.enqueue_origination(&cp)?;

        Ok(cp)
    }

    async fn accepted_offer(&self, tx: &mut S::Tx, app: &Application) -> AppResult<LoanOffer> {
        let offer_id = app
            .loan_offer_id
            .ok_or_else(|| AppError::Forbidden("No loan offer has been issued".to_string()))?;
        let offer = self
            .store
            .find_loan_offer(tx, offer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan offer", offer_id))?;
        if offer.status != LoanOfferStatus::Accepted {
            return Err(AppError::Forbidden(
                "The loan offer has not been accepted".to_string(),
            ));
        }
        Ok(offer)
    }

    fn enqueue_origination(&self, cp: &ConditionPrecedent) -> AppResult<()> {
        self.jobs
            .enqueue(JobPayload::GenerateLoan(ConditionPrecedentJob {
                condition_precedent_id: cp.id,
            }))
            .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        Ok(())
    }
}
