//! HSF Backend Library
//!
//! Property purchase applications, their multi-party review workflow, the
//! mortgage decision lifecycle and loan origination with repayment tracking.

pub mod amortization;
pub mod application;
pub mod auth;
pub mod config;
pub mod db;
pub mod dip;
pub mod error;
pub mod escrow;
pub mod handlers;
pub mod jobs;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod repository;
pub mod review;
pub mod routes;
pub mod state;
