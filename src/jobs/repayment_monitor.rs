//! Repayment monitor
//!
//! A daily scan enqueues every pending installment past its due date; the
//! handler re-checks the installment and flags it overdue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::{Job, JobHandler, JobPayload, JobSink, RepaymentJob};
use crate::notifications::{self, Notification, Notifier, Recipient};
use crate::repository::Store;

pub struct RepaymentMonitor<S: Store> {
    store: Arc<S>,
    jobs: Arc<dyn JobSink>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> RepaymentMonitor<S> {
    pub fn new(store: Arc<S>, jobs: Arc<dyn JobSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            jobs,
            notifier,
        }
    }

    /// Enqueue a check for every installment due before `today`
    pub async fn scan_due(&self, today: NaiveDate) -> AppResult<usize> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        let due = store.list_past_due_repayments(&mut tx, today).await?;
        drop(tx);

        for entry in &due {
            self.jobs
                .enqueue(JobPayload::CheckRepayment(RepaymentJob {
                    loan_id: entry.loan_id,
                    repayment_id: entry.id,
                }))
                .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
        }

        tracing::info!(today = %today, count = due.len(), "Repayment scan finished");
        Ok(due.len())
    }

    /// Flag one installment overdue if it is still unpaid past its due date.
    /// Returns whether this call changed it.
    pub async fn check_repayment(&self, repayment_id: Uuid, today: NaiveDate) -> AppResult<bool> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let entry = store
            .find_repayment(&mut tx, repayment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Repayment", repayment_id))?;
        if !entry.is_overdue_on(today) {
            return Ok(false);
        }
        if !store.mark_repayment_overdue(&mut tx, entry.id).await? {
            return Ok(false);
        }

        let loan = store
            .find_loan(&mut tx, entry.loan_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan", entry.loan_id))?;
        store.commit(tx).await?;

        tracing::warn!(
            loan_id = %loan.id,
            repayment_id = %entry.id,
            payment_number = entry.payment_number,
            due_date = %entry.due_date,
            "Repayment overdue"
        );
        notifications::send(
            self.notifier.as_ref(),
            Notification::new("repayment_overdue", Recipient::User(loan.user_id))
                .with("loan_id", loan.id)
                .with("payment_number", entry.payment_number)
                .with("due_date", entry.due_date)
                .with("total_due", entry.total_due),
        )
        .await;

        Ok(true)
    }
}

#[async_trait]
impl<S: Store> JobHandler for RepaymentMonitor<S> {
    async fn handle(&self, job: &Job) -> AppResult<()> {
        let JobPayload::CheckRepayment(payload) = job.payload else {
            return Err(AppError::Invalid(format!(
                "unexpected job on the repayment queue: {:?}",
                job.payload
            )));
        };

        self.check_repayment(payload.repayment_id, Utc::now().date_naive())
            .await?;
        Ok(())
    }
}
