//! Amortization engine
//!
//! Computes a level-payment repayment schedule from a loan's terms. Money is
//! carried at full `Decimal` precision through the walk and rounded to two
//! places only on the emitted rows.

use chrono::{Days, Months, NaiveDate};
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;
use thiserror::Error;

use crate::loan::RepaymentFrequency;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AmortizationError {
    #[error("principal must be greater than zero")]
    NonPositivePrincipal,

    #[error("interest rate must not be negative")]
    NegativeRate,

    #[error("a {term_months}-month term yields no {frequency:?} payments")]
    NoPayments {
        frequency: RepaymentFrequency,
        term_months: u32,
    },

    #[error("schedule arithmetic overflowed")]
    Overflow,

    #[error("due date is out of range")]
    DateOutOfRange,
}

/// Distance between two consecutive due dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarStep {
    Days(u64),
    Months(u32),
}

impl CalendarStep {
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            CalendarStep::Days(days) => date.checked_add_days(Days::new(days)),
            CalendarStep::Months(months) => date.checked_add_months(Months::new(months)),
        }
    }
}

impl RepaymentFrequency {
    /// Number of installments over a term
    pub fn payment_count(&self, term_months: u32) -> u32 {
        match self {
            RepaymentFrequency::Daily => 30 * term_months,
            RepaymentFrequency::Weekly => 4 * term_months,
            RepaymentFrequency::BiWeekly => 2 * term_months,
            RepaymentFrequency::Monthly => term_months,
            RepaymentFrequency::Quarterly => term_months / 3,
            RepaymentFrequency::SemiAnnually => term_months / 6,
            RepaymentFrequency::Annually => term_months / 12,
        }
    }

    pub fn step(&self) -> CalendarStep {
        match self {
            RepaymentFrequency::Daily => CalendarStep::Days(1),
            RepaymentFrequency::Weekly => CalendarStep::Days(7),
            RepaymentFrequency::BiWeekly => CalendarStep::Days(14),
            RepaymentFrequency::Monthly => CalendarStep::Months(1),
            RepaymentFrequency::Quarterly => CalendarStep::Months(3),
            RepaymentFrequency::SemiAnnually => CalendarStep::Months(6),
            RepaymentFrequency::Annually => CalendarStep::Months(12),
        }
    }
}

/// Rates above 1 are percentages (12 means 12%)
pub fn normalize_rate(rate: Decimal) -> Decimal {
    if rate > Decimal::ONE {
        rate / Decimal::ONE_HUNDRED
    } else {
        rate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub frequency: RepaymentFrequency,
    /// First due date is one step after this date
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledPayment {
    pub payment_number: u32,
    pub due_date: NaiveDate,
    pub principal_due: Decimal,
    pub interest_due: Decimal,
    pub total_due: Decimal,
    /// Unrounded balance after this payment
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmortizationSchedule {
    pub periodic_rate: Decimal,
    pub payment: Decimal,
    pub payments: Vec<ScheduledPayment>,
}

impl AmortizationSchedule {
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.payments.last().map(|p| p.due_date)
    }

    pub fn final_balance(&self) -> Decimal {
        self.payments
            .last()
            .map(|p| p.balance_after)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Build the full schedule for a set of loan terms
pub fn amortize(terms: &LoanTerms) -> Result<AmortizationSchedule, AmortizationError> {
    if terms.principal <= Decimal::ZERO {
        return Err(AmortizationError::NonPositivePrincipal);
    }

    let annual_rate = normalize_rate(terms.annual_rate);
    if annual_rate < Decimal::ZERO {
        return Err(AmortizationError::NegativeRate);
    }

    let count = terms.frequency.payment_count(terms.term_months);
    if count == 0 {
        return Err(AmortizationError::NoPayments {
            frequency: terms.frequency,
            term_months: terms.term_months,
        });
    }

    let periodic_rate = annual_rate / Decimal::from(count);
    let payment = level_payment(terms.principal, periodic_rate, count)?;
    let total_due = payment.round_dp(2);
    let step = terms.frequency.step();

    let mut balance = terms.principal;
    let mut due_date = terms.start_date;
    let mut payments = Vec::with_capacity(count as usize);

    for payment_number in 1..=count {
        let interest = balance
            .checked_mul(periodic_rate)
            .ok_or(AmortizationError::Overflow)?;
        let principal = payment - interest;
        balance -= principal;
        due_date = step
            .advance(due_date)
            .ok_or(AmortizationError::DateOutOfRange)?;

        let interest_due = interest.round_dp(2);
        payments.push(ScheduledPayment {
            payment_number,
            due_date,
            principal_due: total_due - interest_due,
            interest_due,
            total_due,
            balance_after: balance,
        });
    }

    Ok(AmortizationSchedule {
        periodic_rate,
        payment: total_due,
        payments,
    })
}

/// Annuity payment: P·i / (1 − (1+i)^−N), or P/N without interest
fn level_payment(principal: Decimal, rate: Decimal, count: u32) -> Result<Decimal, AmortizationError> {
    if rate.is_zero() {
        return Ok(principal / Decimal::from(count));
    }

    let growth = (Decimal::ONE + rate)
        .checked_powi(i64::from(count))
        .ok_or(AmortizationError::Overflow)?;
    let discount = Decimal::ONE
        .checked_div(growth)
        .ok_or(AmortizationError::Overflow)?;

    principal
        .checked_mul(rate)
        .and_then(|numerator| numerator.checked_div(Decimal::ONE - discount))
        .ok_or(AmortizationError::Overflow)
}
