//! Property purchase applications
//!
//! The application is the aggregate every sub-workflow hangs off: offer
//! letter review, escrow meeting, property closing and the mortgage path.

pub mod model;
pub mod service;

pub use model::*;
pub use service::ApplicationService;
