//! Review workflow engine
//!
//! Drives a request through its configured stages, one Pending approval at
//! a time, and reports when the request reaches a terminal status.

pub mod model;
pub mod routing;
pub mod service;

pub use model::*;
pub use routing::{route_stage, RoutingContext, RoutingError};
pub use service::ReviewEngine;
