//! Loan origination
//!
//! Turns a cleared condition precedent into a loan and its repayment
//! schedule. The loan, the schedule and the application's completion are
//! written in one transaction; a second delivery of the same job finds the
//! loan and stops.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::amortization::{amortize, normalize_rate, LoanTerms};
use crate::application::service::{append_stage, load_application};
use crate::application::{ApplicationStage, ApplicationStatus};
use crate::dip::{ConditionPrecedentStatus, LoanOfferStatus};
use crate::error::{AppError, AppResult};
use crate::jobs::{ConditionPrecedentJob, Job, JobHandler, JobPayload, JobSink};
use crate::loan::{Loan, LoanStatus, RepaymentScheduleEntry, RepaymentStatus};
use crate::notifications::{self, Notification, Notifier, Recipient};
use crate::repository::{Store, StoreError};

pub struct LoanOriginationWorker<S: Store> {
    store: Arc<S>,
    jobs: Arc<dyn JobSink>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> LoanOriginationWorker<S> {
    pub fn new(store: Arc<S>, jobs: Arc<dyn JobSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            jobs,
            notifier,
        }
    }

    /// Originate the loan for one condition precedent. Returns `None` when a
    /// loan already exists for the application.
    pub async fn originate(&self, condition_precedent_id: Uuid) -> AppResult<Option<Loan>> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let cp = store
            .find_condition_precedent(&mut tx, condition_precedent_id)
            .await?
            .ok_or_else(|| AppError::not_found("Condition precedent", condition_precedent_id))?;
        let mut app = load_application(store, &mut tx, cp.application_id).await?;

        if let Some(existing) = store.find_loan_by_application(&mut tx, app.id).await? {
            tracing::info!(application_id = %app.id, loan_id = %existing.id, "Loan already originated");
            return Ok(None);
        }

        let offer = store
            .find_loan_offer(&mut tx, cp.loan_offer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan offer", cp.loan_offer_id))?;
        if offer.status != LoanOfferStatus::Accepted {
            return Err(AppError::Invalid(
                "The loan offer has not been accepted".to_string(),
            ));
        }

        let term_months = u32::try_from(offer.term_months)
            .map_err(|_| AppError::Invalid(format!("Invalid term of {} months", offer.term_months)))?;
        let start_date = Utc::now().date_naive();
        let schedule = amortize(&LoanTerms {
            principal: offer.principal,
            annual_rate: offer.interest_rate,
            term_months,
            frequency: offer.repayment_frequency,
            start_date,
        })?;
        let end_date = schedule
            .end_date()
            .ok_or_else(|| AppError::Internal("empty repayment schedule".to_string()))?;

        let now = Utc::now();
        let loan = Loan {
            id: Uuid::new_v4(),
            application_id: app.id,
            loan_offer_id: offer.id,
            user_id: app.user_id,
            principal: offer.principal,
            interest_rate: normalize_rate(offer.interest_rate),
            repayment_frequency: offer.repayment_frequency,
            term_months: offer.term_months,
            start_date,
            end_date,
            remaining_balance: offer.principal,
            total_interest_paid: Decimal::ZERO,
            total_principal_paid: Decimal::ZERO,
            status: LoanStatus::Active,
            created_at: now,
            updated_at: now,
        };

        match store.insert_loan(&mut tx, &loan).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                tracing::info!(application_id = %app.id, "Loan originated concurrently");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let entries = schedule
            .payments
            .iter()
            .map(|p| {
                Ok(RepaymentScheduleEntry {
                    id: Uuid::new_v4(),
                    loan_id: loan.id,
                    payment_number: i32::try_from(p.payment_number).map_err(|_| {
                        AppError::Invalid("Too many installments".to_string())
                    })?,
                    due_date: p.due_date,
                    principal_due: p.principal_due,
                    interest_due: p.interest_due,
                    total_due: p.total_due,
                    status: RepaymentStatus::Pending,
                    paid_at: None,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        store.insert_schedule(&mut tx, &entries).await?;

        store
            .set_condition_precedent_status(&mut tx, cp.id, ConditionPrecedentStatus::Completed)
            .await?;
        app.set_status(ApplicationStatus::Completed);
        store.update_application(&mut tx, &app).await?;
        append_stage(store, &mut tx, app.id, ApplicationStage::LoanGenerated, app.user_id).await?;

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            loan_id = %loan.id,
            principal = %loan.principal,
            installments = entries.len(),
            installment = %schedule.payment,
            "Loan originated"
        );
        notifications::send(
            self.notifier.as_ref(),
            Notification::new("loan_generated", Recipient::User(app.user_id))
                .with("application_id", app.id)
                .with("loan_id", loan.id)
                .with("installment", schedule.payment)
                .with("first_due_date", entries.first().map(|e| e.due_date).unwrap_or(end_date)),
        )
        .await;

        Ok(Some(loan))
    }

    /// Re-enqueue condition precedents that never produced a loan
    pub async fn sweep(&self) -> AppResult<usize> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        let pending = store.list_unoriginated_condition_precedents(&mut tx).await?;
        drop(tx);

        for cp in &pending {
            self.jobs
                .enqueue(JobPayload::GenerateLoan(ConditionPrecedentJob {
                    condition_precedent_id: cp.id,
                }))
                .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Re-enqueued unoriginated loans");
        }
        Ok(pending.len())
    }
}

#[async_trait]
impl<S: Store> JobHandler for LoanOriginationWorker<S> {
    async fn handle(&self, job: &Job) -> AppResult<()> {
        let JobPayload::GenerateLoan(payload) = job.payload else {
            return Err(AppError::Invalid(format!(
                "unexpected job on the loan queue: {:?}",
                job.payload
            )));
        };

        self.originate(payload.condition_precedent_id).await?;
        Ok(())
    }
}
