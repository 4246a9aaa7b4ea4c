//! Loan service layer - loan reads and repayment bookkeeping

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::loan::{Loan, LoanStatus, LoanWithSchedule, RepaymentScheduleEntry, RepaymentStatus};
use crate::models::Actor;
use crate::notifications::{self, Notification, Notifier, Recipient};
use crate::repository::Store;

/// Loan service for reading loans and recording repayments
pub struct LoanService<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: Store> Clone for LoanService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: Store> LoanService<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn get_loan(&self, actor: &Actor, loan_id: Uuid) -> AppResult<Loan> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let loan = store
            .find_loan(&mut tx, loan_id)
            .await?
            .filter(|loan| loan.user_id == actor.user_id)
            .ok_or_else(|| AppError::not_found("Loan", loan_id))?;
        Ok(loan)
    }

    pub async fn list_loans_for_user(&self, actor: &Actor) -> AppResult<Vec<Loan>> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        Ok(store.list_loans_for_user(&mut tx, actor.user_id).await?)
    }

    /// Loan with its repayment schedule ordered by payment number
    pub async fn get_schedule(&self, actor: &Actor, loan_id: Uuid) -> AppResult<LoanWithSchedule> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let loan = store
            .find_loan(&mut tx, loan_id)
            .await?
            .filter(|loan| loan.user_id == actor.user_id)
            .ok_or_else(|| AppError::not_found("Loan", loan_id))?;
        let schedule = store.list_schedule(&mut tx, loan.id).await?;

        Ok(LoanWithSchedule { loan, schedule })
    }

    /// Settle one installment. A repeat for an already paid installment is
    /// accepted and changes nothing.
    pub async fn record_repayment(
        &self,
        repayment_id: Uuid,
        amount: Decimal,
    ) -> AppResult<RepaymentScheduleEntry> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut entry = store
            .find_repayment(&mut tx, repayment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Repayment", repayment_id))?;

        if entry.status == RepaymentStatus::Paid {
            tracing::info!(repayment_id = %entry.id, "Repayment already recorded");
            return Ok(entry);
        }
        if amount < entry.total_due {
            return Err(AppError::Invalid(format!(
                "Payment of {} does not cover the {} due",
                amount, entry.total_due
            )));
        }

        let paid_at = Utc::now();
        if !store.mark_repayment_paid(&mut tx, entry.id, paid_at).await? {
            return Err(AppError::Conflict(
                "Repayment was recorded concurrently".to_string(),
            ));
        }
        entry.status = RepaymentStatus::Paid;
        entry.paid_at = Some(paid_at);

        let mut loan = store
            .find_loan(&mut tx, entry.loan_id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan", entry.loan_id))?;
        loan.apply_payment(&entry);

        let settled = store
            .list_schedule(&mut tx, loan.id)
            .await?
            .iter()
            .all(|e| e.status == RepaymentStatus::Paid);
        if settled {
            loan.status = LoanStatus::Completed;
            loan.remaining_balance = Decimal::ZERO;
        }
        store.update_loan(&mut tx, &loan).await?;
        store.commit(tx).await?;

        tracing::info!(
            loan_id = %loan.id,
            repayment_id = %entry.id,
            payment_number = entry.payment_number,
            remaining_balance = %loan.remaining_balance,
            "Repayment recorded"
        );
        notifications::send(
            self.notifier.as_ref(),
            Notification::new(
                if settled { "loan_completed" } else { "repayment_received" },
                Recipient::User(loan.user_id),
            )
            .with("loan_id", loan.id)
            .with("payment_number", entry.payment_number)
            .with("remaining_balance", loan.remaining_balance),
        )
        .await;

        Ok(entry)
    }
}
