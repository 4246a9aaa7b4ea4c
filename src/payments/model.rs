//! Payment webhook payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    #[serde(rename = "charge.success")]
    ChargeSuccess,
    #[serde(rename = "transfer.failed")]
    TransferFailed,
    #[serde(other)]
    Other,
}

/// What a charge paid for, as tagged by the checkout that created it
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[serde(alias = "managementFee")]
    ManagementFee,
    #[serde(alias = "dueDiligence")]
    DueDiligence,
    #[serde(alias = "loanRepayment")]
    LoanRepayment,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentMetadata {
    pub application_id: Option<Uuid>,
    #[serde(rename = "paymentType")]
    pub payment_type: Option<PaymentType>,
    pub repayment_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentData {
    pub reference: String,
    pub amount: Option<Decimal>,
    pub metadata: Option<PaymentMetadata>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentEvent {
    pub event: PaymentEventKind,
    pub data: PaymentData,
}

/// What the webhook did with an event
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    ManagementFeeRecorded,
    DueDiligenceRecorded,
    RepaymentRecorded,
    Ignored,
}
