//! Mortgage decision lifecycle
//!
//! Eligibility, Decision in Principle, loan offer and the condition
//! precedent that gates loan origination.

pub mod model;
pub mod service;

pub use model::*;
pub use service::DipService;
