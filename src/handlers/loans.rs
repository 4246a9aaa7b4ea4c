//! Loan read handlers

use axum::extract::{Path, State};
use uuid::Uuid;

use super::{ok, ApiResult};
use crate::loan::{Loan, LoanService, LoanWithSchedule};
use crate::middleware::AuthenticatedUser;
use crate::repository::Store;

pub async fn list_loans<S: Store>(
    State(service): State<LoanService<S>>,
    user: AuthenticatedUser,
) -> ApiResult<Vec<Loan>> {
    ok(service.list_loans_for_user(&user.actor).await?)
}

pub async fn get_loan<S: Store>(
    State(service): State<LoanService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Loan> {
    ok(service.get_loan(&user.actor, id).await?)
}

pub async fn get_loan_schedule<S: Store>(
    State(service): State<LoanService<S>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanWithSchedule> {
    ok(service.get_schedule(&user.actor, id).await?)
}
