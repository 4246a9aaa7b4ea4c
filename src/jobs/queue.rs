//! Named in-process job queues with retrying workers
//!
//! Delivery is at-least-once: a failed job is re-sent after an exponential
//! backoff until it runs out of attempts. Handlers must be idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    DipGeneration,
    LoanOrigination,
    RepaymentMonitor,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [
        QueueName::DipGeneration,
        QueueName::LoanOrigination,
        QueueName::RepaymentMonitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::DipGeneration => "dip-generation",
            QueueName::LoanOrigination => "loan-origination",
            QueueName::RepaymentMonitor => "repayment-monitor",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityJob {
    pub eligibility_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionPrecedentJob {
    pub condition_precedent_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentJob {
    pub loan_id: Uuid,
    pub repayment_id: Uuid,
}

/// Job payloads carry identifiers only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPayload {
    GenerateDip(EligibilityJob),
    GenerateLoan(ConditionPrecedentJob),
    CheckRepayment(RepaymentJob),
}

impl JobPayload {
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::GenerateDip(_) => QueueName::DipGeneration,
            JobPayload::GenerateLoan(_) => QueueName::LoanOrigination,
            JobPayload::CheckRepayment(_) => QueueName::RepaymentMonitor,
        }
    }

    /// Id of the record the job works on, for logging
    pub fn entity_id(&self) -> Uuid {
        match self {
            JobPayload::GenerateDip(job) => job.eligibility_id,
            JobPayload::GenerateLoan(job) => job.condition_precedent_id,
            JobPayload::CheckRepayment(job) => job.repayment_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            JobPayload::GenerateDip(job) => serde_json::to_value(job),
            JobPayload::GenerateLoan(job) => serde_json::to_value(job),
            JobPayload::CheckRepayment(job) => serde_json::to_value(job),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    /// 1 on first delivery
    pub attempt: u32,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempt: 1,
        }
    }

    fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("queue {0} is closed")]
    Closed(QueueName),
}

/// Anything that accepts jobs
pub trait JobSink: Send + Sync {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid, JobError>;
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub backoff: Duration,
}

impl QueueSettings {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}

/// Sending side of every queue
#[derive(Clone)]
pub struct JobQueue {
    senders: Arc<HashMap<QueueName, mpsc::UnboundedSender<Job>>>,
}

/// Receiving side, handed to the workers once
pub struct JobReceivers {
    receivers: HashMap<QueueName, mpsc::UnboundedReceiver<Job>>,
}

impl JobReceivers {
    pub fn take(&mut self, queue: QueueName) -> Option<mpsc::UnboundedReceiver<Job>> {
        self.receivers.remove(&queue)
    }
}

impl JobQueue {
    pub fn new() -> (Self, JobReceivers) {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for queue in QueueName::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(queue, tx);
            receivers.insert(queue, rx);
        }

        (
            Self {
                senders: Arc::new(senders),
            },
            JobReceivers { receivers },
        )
    }

    fn send(&self, job: Job) -> Result<(), JobError> {
        let queue = job.payload.queue();
        self.senders
            .get(&queue)
            .ok_or(JobError::Closed(queue))?
            .send(job)
            .map_err(|_| JobError::Closed(queue))
    }
}

impl JobSink for JobQueue {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid, JobError> {
        let job = Job::new(payload);
        let job_id = job.id;
        self.send(job)?;

        tracing::debug!(
            job_id = %job_id,
            queue = %payload.queue(),
            payload = %payload.to_json(),
            "Job enqueued"
        );
        Ok(job_id)
    }
}

/// Spawn `settings.concurrency` workers consuming one queue
pub fn start_workers<H: JobHandler>(
    queue: JobQueue,
    name: QueueName,
    receiver: mpsc::UnboundedReceiver<Job>,
    settings: QueueSettings,
    handler: Arc<H>,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..settings.concurrency.max(1))
        .map(|worker| {
            let receiver = receiver.clone();
            let handler = handler.clone();
            let queue = queue.clone();

            tokio::spawn(async move {
                tracing::info!(queue = %name, worker, "Worker started");
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(job) = next else { break };
                    run_job(&queue, name, &settings, handler.as_ref(), job).await;
                }
                tracing::info!(queue = %name, worker, "Worker stopped");
            })
        })
        .collect()
}

async fn run_job<H: JobHandler>(
    queue: &JobQueue,
    name: QueueName,
    settings: &QueueSettings,
    handler: &H,
    job: Job,
) {
    let entity_id = job.payload.entity_id();

    match handler.handle(&job).await {
        Ok(()) => {
            tracing::info!(
                job_id = %job.id,
                queue = %name,
                entity_id = %entity_id,
                attempt = job.attempt,
                "Job completed"
            );
        }
        Err(e) if job.attempt >= settings.max_attempts || !e.is_retryable() => {
            tracing::error!(
                job_id = %job.id,
                queue = %name,
                entity_id = %entity_id,
                attempt = job.attempt,
                error = %e,
                "Job failed permanently"
            );
        }
        Err(e) => {
            let delay = settings.backoff_for(job.attempt);
            tracing::warn!(
                job_id = %job.id,
                queue = %name,
                entity_id = %entity_id,
                attempt = job.attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "Job failed, retrying"
            );

            let queue = queue.clone();
            let retry = job.retry();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.send(retry) {
                    tracing::error!(queue = %name, error = %e, "Could not requeue job");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyHandler {
        failures: u32,
        calls: AtomicU32,
        done: mpsc::UnboundedSender<u32>,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, job: &Job) -> AppResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(AppError::Internal("transient".to_string()));
            }
            let _ = self.done.send(job.attempt);
            Ok(())
        }
    }

    fn settings(max_attempts: u32) -> QueueSettings {
        QueueSettings {
            concurrency: 2,
            max_attempts,
            backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_payload_wire_format() {
        let cp = Uuid::new_v4();
        let payload = JobPayload::GenerateLoan(ConditionPrecedentJob {
            condition_precedent_id: cp,
        });
        assert_eq!(payload.queue(), QueueName::LoanOrigination);
        assert_eq!(payload.to_json(), serde_json::json!({ "conditionPrecedentId": cp }));

        let loan = Uuid::new_v4();
        let repayment = Uuid::new_v4();
        let payload = JobPayload::CheckRepayment(RepaymentJob {
            loan_id: loan,
            repayment_id: repayment,
        });
        assert_eq!(
            payload.to_json(),
            serde_json::json!({ "loanId": loan, "repaymentId": repayment })
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let s = settings(5);
        assert_eq!(s.backoff_for(1), Duration::from_millis(5));
        assert_eq!(s.backoff_for(2), Duration::from_millis(10));
        assert_eq!(s.backoff_for(3), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_failed_job_is_retried() {
        let (queue, mut receivers) = JobQueue::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(FlakyHandler {
            failures: 2,
            calls: AtomicU32::new(0),
            done: done_tx,
        });

        start_workers(
            queue.clone(),
            QueueName::DipGeneration,
            receivers.take(QueueName::DipGeneration).unwrap(),
            settings(5),
            handler.clone(),
        );
        queue
            .enqueue(JobPayload::GenerateDip(EligibilityJob {
                eligibility_id: Uuid::new_v4(),
            }))
            .unwrap();

        let attempt = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_job_gives_up_after_max_attempts() {
        let (queue, mut receivers) = JobQueue::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(FlakyHandler {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            done: done_tx,
        });

        start_workers(
            queue.clone(),
            QueueName::DipGeneration,
            receivers.take(QueueName::DipGeneration).unwrap(),
            settings(3),
            handler.clone(),
        );
        queue
            .enqueue(JobPayload::GenerateDip(EligibilityJob {
                eligibility_id: Uuid::new_v4(),
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(done_rx.try_recv().is_err());
    }
}
