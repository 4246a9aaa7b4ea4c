//! Escrow domain module
//!
//! Escrow meetings are scheduled by the buyer, confirmed through a review
//! request, then accepted or declined by the buyer.

mod model;
mod service;

pub use model::*;
pub use service::EscrowService;
