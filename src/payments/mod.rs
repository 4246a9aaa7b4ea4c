//! Payment provider callbacks

pub mod model;
pub mod service;

pub use model::*;
pub use service::{verify_signature, PaymentService, SIGNATURE_HEADER};
