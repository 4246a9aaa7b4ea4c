//! API handlers for the HSF backend
//!
//! Handlers are generic over the store so the same router serves the
//! PostgreSQL and in-memory backends.

pub mod applications;
pub mod dips;
pub mod escrow;
pub mod health;
pub mod loans;
pub mod payments;
pub mod reviews;

pub use applications::*;
pub use dips::*;
pub use escrow::*;
pub use health::*;
pub use loans::*;
pub use payments::*;
pub use reviews::*;

use axum::{http::StatusCode, Json};

use crate::error::AppError;
use crate::models::ApiResponse;

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn created<T>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}
