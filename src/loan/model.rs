//! Loan models
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a borrower repays
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "repayment_frequency", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
}

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Completed,
    Defaulted,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Overdue,
    Paid,
}

/// Loan model, at most one per application
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Loan {
    pub id: Uuid,
    pub application_id: Uuid,
    pub loan_offer_id: Uuid,
    pub user_id: Uuid,
    pub principal: Decimal,
    /// Normalized annual rate (0.12 for 12%)
    pub interest_rate: Decimal,
    pub repayment_frequency: RepaymentFrequency,
    pub term_months: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub remaining_balance: Decimal,
    pub total_interest_paid: Decimal,
    pub total_principal_paid: Decimal,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Apply a paid installment to the running balances
    pub fn apply_payment(&mut self, entry: &RepaymentScheduleEntry) {
        self.remaining_balance = (self.remaining_balance - entry.principal_due).max(Decimal::ZERO);
        self.total_principal_paid += entry.principal_due;
        self.total_interest_paid += entry.interest_due;
        self.updated_at = Utc::now();
    }
}

/// One installment of a loan's repayment schedule
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct RepaymentScheduleEntry {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub payment_number: i32,
    pub due_date: NaiveDate,
    pub principal_due: Decimal,
    pub interest_due: Decimal,
    pub total_due: Decimal,
    pub status: RepaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl RepaymentScheduleEntry {
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status == RepaymentStatus::Pending && self.due_date < today
    }
}

/// Loan with its full schedule
#[derive(Debug, Serialize)]
pub struct LoanWithSchedule {
    pub loan: Loan,
    pub schedule: Vec<RepaymentScheduleEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(status: RepaymentStatus, due: NaiveDate) -> RepaymentScheduleEntry {
        RepaymentScheduleEntry {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            payment_number: 1,
            due_date: due,
            principal_due: dec!(94618.55),
            interest_due: dec!(12000.00),
            total_due: dec!(106618.55),
            status,
            paid_at: None,
        }
    }

    #[test]
    fn test_overdue_only_when_pending_and_past_due() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        assert!(entry(RepaymentStatus::Pending, due).is_overdue_on(next_day));
        assert!(!entry(RepaymentStatus::Pending, due).is_overdue_on(due));
        assert!(!entry(RepaymentStatus::Paid, due).is_overdue_on(next_day));
        assert!(!entry(RepaymentStatus::Overdue, due).is_overdue_on(next_day));
    }

    #[test]
    fn test_frequency_wire_names() {
        assert_eq!(
            serde_json::to_string(&RepaymentFrequency::BiWeekly).unwrap(),
            "\"BI_WEEKLY\""
        );
        assert_eq!(
            serde_json::from_str::<RepaymentFrequency>("\"SEMI_ANNUALLY\"").unwrap(),
            RepaymentFrequency::SemiAnnually
        );
    }
}
