//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::application::ApplicationService;
use crate::auth::TokenVerifier;
use crate::dip::DipService;
use crate::escrow::EscrowService;
use crate::jobs::JobSink;
use crate::loan::LoanService;
use crate::notifications::{ActivityLog, Notifier};
use crate::payments::PaymentService;
use crate::repository::Store;
use crate::review::ReviewEngine;

/// Every domain service, wired to one store and one set of collaborators
pub struct Services<S: Store> {
    pub applications: ApplicationService<S>,
    pub escrow: EscrowService<S>,
    pub dips: DipService<S>,
    pub loans: LoanService<S>,
    pub payments: PaymentService<S>,
}

impl<S: Store> Clone for Services<S> {
    fn clone(&self) -> Self {
        Self {
            applications: self.applications.clone(),
            escrow: self.escrow.clone(),
            dips: self.dips.clone(),
            loans: self.loans.clone(),
            payments: self.payments.clone(),
        }
    }
}

impl<S: Store> Services<S> {
    pub fn new(
        store: Arc<S>,
        engine: ReviewEngine,
        jobs: Arc<dyn JobSink>,
        notifier: Arc<dyn Notifier>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        let dips = DipService::new(store.clone(), jobs.clone(), notifier.clone(), activity.clone());
        let loans = LoanService::new(store.clone(), notifier.clone());

        Self {
            applications: ApplicationService::new(
                store.clone(),
                engine,
                jobs,
                notifier.clone(),
                activity.clone(),
            ),
            escrow: EscrowService::new(store, engine, notifier, activity),
            payments: PaymentService::new(dips.clone(), loans.clone()),
            dips,
            loans,
        }
    }
}

/// Shared application state
pub struct AppState<S: Store> {
    pub services: Services<S>,
    pub tokens: TokenVerifier,
    /// Payment webhook calls are refused while unset
    pub payment_webhook_secret: Option<Arc<str>>,
    /// Pool for health checks when running on PostgreSQL
    pub db_pool: Option<PgPool>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            tokens: self.tokens.clone(),
            payment_webhook_secret: self.payment_webhook_secret.clone(),
            db_pool: self.db_pool.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(
        services: Services<S>,
        tokens: TokenVerifier,
        payment_webhook_secret: Option<String>,
        db_pool: Option<PgPool>,
    ) -> Self {
        Self {
            services,
            tokens,
            payment_webhook_secret: payment_webhook_secret.map(Arc::from),
            db_pool,
        }
    }
}

impl<S: Store> FromRef<AppState<S>> for TokenVerifier {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.tokens.clone()
    }
}

impl<S: Store> FromRef<AppState<S>> for ApplicationService<S> {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.services.applications.clone()
    }
}

impl<S: Store> FromRef<AppState<S>> for EscrowService<S> {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.services.escrow.clone()
    }
}

impl<S: Store> FromRef<AppState<S>> for DipService<S> {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.services.dips.clone()
    }
}

impl<S: Store> FromRef<AppState<S>> for LoanService<S> {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.services.loans.clone()
    }
}

impl<S: Store> FromRef<AppState<S>> for PaymentService<S> {
    fn from_ref(app_state: &AppState<S>) -> Self {
        app_state.services.payments.clone()
    }
}
