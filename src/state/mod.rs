//! Shared router state

mod app_state;

pub use app_state::{AppState, Services};
