//! Background work: queues, their workers and the cron triggers

pub mod dip_generation;
pub mod loan_origination;
pub mod queue;
pub mod repayment_monitor;
pub mod scheduler;

pub use dip_generation::DipGenerationWorker;
pub use loan_origination::LoanOriginationWorker;
pub use queue::{
    start_workers, ConditionPrecedentJob, EligibilityJob, Job, JobError, JobHandler, JobPayload,
    JobQueue, JobReceivers, JobSink, QueueName, QueueSettings, RepaymentJob,
};
pub use repayment_monitor::RepaymentMonitor;
pub use scheduler::{start_scheduler, Schedules};
