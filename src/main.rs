//! HSF Backend Server
//!
//! Serves the HTTP API and runs the background job workers against
//! PostgreSQL, or against an in-memory store when no database is configured.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use hsf_backend::auth::TokenVerifier;
use hsf_backend::config::Config;
use hsf_backend::db;
use hsf_backend::jobs::{
    start_scheduler, start_workers, DipGenerationWorker, JobQueue, LoanOriginationWorker,
    QueueName, RepaymentMonitor,
};
use hsf_backend::middleware::{self, RateLimiter};
use hsf_backend::notifications::{LogNotifier, Notifier, TracingActivityLog, WebhookNotifier};
use hsf_backend::repository::{MemoryStore, PgStore, Store};
use hsf_backend::review::ReviewEngine;
use hsf_backend::routes;
use hsf_backend::state::{AppState, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting HSF backend");

    match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!(
                database = config.database_url_masked().as_deref().unwrap_or_default(),
                "Connecting to database"
            );
            let pool = db::create_pool(url, config.db_max_connections).await?;
            db::prepare(&pool).await?;
            serve(Arc::new(PgStore::new(pool.clone())), &config, Some(pool)).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            serve(Arc::new(MemoryStore::new()), &config, None).await
        }
    }
}

async fn serve<S: Store>(store: Arc<S>, config: &Config, db_pool: Option<PgPool>) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = match &config.notification_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => {
            tracing::warn!("NOTIFICATION_WEBHOOK_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let (queue, mut receivers) = JobQueue::new();
    let jobs = Arc::new(queue.clone());

    let services = Services::new(
        store.clone(),
        ReviewEngine::new(config.rejection_policy),
        jobs.clone(),
        notifier.clone(),
        Arc::new(TracingActivityLog),
    );

    // Workers
    let dip_generation = Arc::new(DipGenerationWorker::new(services.dips.clone()));
    let origination = Arc::new(LoanOriginationWorker::new(
        store.clone(),
        jobs.clone(),
        notifier.clone(),
    ));
    let monitor = Arc::new(RepaymentMonitor::new(store, jobs, notifier));

    let mut workers = Vec::new();
    workers.extend(start_workers(
        queue.clone(),
        QueueName::DipGeneration,
        receivers
            .take(QueueName::DipGeneration)
            .context("dip-generation queue already taken")?,
        config.jobs.queue_settings(config.jobs.dip_generation_concurrency),
        dip_generation.clone(),
    ));
    workers.extend(start_workers(
        queue.clone(),
        QueueName::LoanOrigination,
        receivers
            .take(QueueName::LoanOrigination)
            .context("loan-origination queue already taken")?,
        config.jobs.queue_settings(config.jobs.loan_origination_concurrency),
        origination.clone(),
    ));
    workers.extend(start_workers(
        queue.clone(),
        QueueName::RepaymentMonitor,
        receivers
            .take(QueueName::RepaymentMonitor)
            .context("repayment-monitor queue already taken")?,
        config.jobs.queue_settings(config.jobs.repayment_monitor_concurrency),
        monitor.clone(),
    ));
    tracing::info!(workers = workers.len(), "Job workers started");

    let mut scheduler = start_scheduler(&config.jobs.schedules, monitor, origination, dip_generation)
        .await
        .context("Failed to start job scheduler")?;

    // Rate limiting
    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    let evictor = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let evicted = evictor.evict_idle(Duration::from_secs(600)).await;
            tracing::debug!(evicted, "Rate limiter buckets evicted");
        }
    });

    let state = AppState::new(
        services,
        TokenVerifier::new(&config.jwt_secret),
        config.payment_webhook_secret.clone(),
        db_pool,
    );
    if state.payment_webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, the payment webhook rejects every call");
    }

    let mut app = routes::app(state)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit,
        ))
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Job scheduler did not shut down cleanly");
    }
    for worker in workers {
        worker.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
