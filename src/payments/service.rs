//! Payment webhook handling
//!
//! Providers redeliver callbacks, so every effect here is idempotent.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha512;
use uuid::Uuid;

use crate::dip::DipService;
use crate::error::{AppError, AppResult};
use crate::loan::LoanService;
use crate::payments::{PaymentEvent, PaymentEventKind, PaymentOutcome, PaymentType};
use crate::repository::Store;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

/// Check a hex HMAC-SHA512 of the raw body against the shared secret
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct PaymentService<S: Store> {
    dips: DipService<S>,
    loans: LoanService<S>,
}

impl<S: Store> Clone for PaymentService<S> {
    fn clone(&self) -> Self {
        Self {
            dips: self.dips.clone(),
            loans: self.loans.clone(),
        }
    }
}

impl<S: Store> PaymentService<S> {
    pub fn new(dips: DipService<S>, loans: LoanService<S>) -> Self {
        Self { dips, loans }
    }

    pub async fn handle_event(&self, event: PaymentEvent) -> AppResult<PaymentOutcome> {
        let reference = event.data.reference.as_str();
        if event.event != PaymentEventKind::ChargeSuccess {
            tracing::debug!(reference, event = ?event.event, "Payment event ignored");
            return Ok(PaymentOutcome::Ignored);
        }
        let Some(metadata) = event.data.metadata else {
            tracing::debug!(reference, "Payment without metadata ignored");
            return Ok(PaymentOutcome::Ignored);
        };

        let outcome = match metadata.payment_type {
            Some(PaymentType::ManagementFee) => {
                require_amount(event.data.amount)?;
                let application_id = require_application(metadata.application_id)?;
                self.dips.record_management_fee(application_id).await?;
                PaymentOutcome::ManagementFeeRecorded
            }
            Some(PaymentType::DueDiligence) => {
                let application_id = require_application(metadata.application_id)?;
                self.dips.mark_due_diligence_paid(application_id).await?;
                PaymentOutcome::DueDiligenceRecorded
            }
            Some(PaymentType::LoanRepayment) => {
                let amount = require_amount(event.data.amount)?;
                let repayment_id = metadata.repayment_id.ok_or_else(|| {
                    AppError::Invalid("Loan repayment without repayment_id".to_string())
                })?;
                self.loans.record_repayment(repayment_id, amount).await?;
                PaymentOutcome::RepaymentRecorded
            }
            Some(PaymentType::Other) | None => PaymentOutcome::Ignored,
        };

        tracing::info!(reference, outcome = ?outcome, "Payment event handled");
        Ok(outcome)
    }
}

fn require_amount(amount: Option<Decimal>) -> AppResult<Decimal> {
    amount.ok_or_else(|| AppError::Invalid("Payment amount is required".to_string()))
}

fn require_application(application_id: Option<Uuid>) -> AppResult<Uuid> {
    application_id.ok_or_else(|| AppError::Invalid("Payment without application_id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("whsec", body);

        assert!(verify_signature("whsec", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", b"{}", &signature));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        assert!(!verify_signature("whsec", b"{}", "not-hex"));
        assert!(!verify_signature("whsec", b"{}", ""));
    }
}
