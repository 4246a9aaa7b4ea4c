//! Cron triggers for the periodic jobs

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};

use crate::jobs::{DipGenerationWorker, LoanOriginationWorker, RepaymentMonitor};
use crate::repository::Store;

/// Cron expressions (seconds first) for the periodic jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedules {
    pub repayment_scan: String,
    pub origination_sweep: String,
    pub dip_sweep: String,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            repayment_scan: "0 0 1 * * *".to_string(),
            origination_sweep: "0 */15 * * * *".to_string(),
            dip_sweep: "0 */15 * * * *".to_string(),
        }
    }
}

pub async fn start_scheduler<S: Store>(
    schedules: &Schedules,
    monitor: Arc<RepaymentMonitor<S>>,
    origination: Arc<LoanOriginationWorker<S>>,
    dip_generation: Arc<DipGenerationWorker<S>>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(CronJob::new_async(
            schedules.repayment_scan.as_str(),
            move |_id, _scheduler| {
                let monitor = monitor.clone();
                Box::pin(async move {
                    if let Err(e) = monitor.scan_due(Utc::now().date_naive()).await {
                        tracing::error!(error = %e, "Repayment scan failed");
                    }
                })
            },
        )?)
        .await?;

    scheduler
        .add(CronJob::new_async(
            schedules.origination_sweep.as_str(),
            move |_id, _scheduler| {
                let origination = origination.clone();
                Box::pin(async move {
                    if let Err(e) = origination.sweep().await {
                        tracing::error!(error = %e, "Loan origination sweep failed");
                    }
                })
            },
        )?)
        .await?;

    scheduler
        .add(CronJob::new_async(
            schedules.dip_sweep.as_str(),
            move |_id, _scheduler| {
                let dip_generation = dip_generation.clone();
                Box::pin(async move {
                    if let Err(e) = dip_generation.sweep().await {
                        tracing::error!(error = %e, "DIP generation sweep failed");
                    }
                })
            },
        )?)
        .await?;

    scheduler.start().await?;
    tracing::info!(
        repayment_scan = %schedules.repayment_scan,
        origination_sweep = %schedules.origination_sweep,
        dip_sweep = %schedules.dip_sweep,
        "Job scheduler started"
    );

    Ok(scheduler)
}
