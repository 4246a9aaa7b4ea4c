//! Worker issuing a DIP once a mortgage application's offer letter clears

use async_trait::async_trait;

use crate::dip::DipService;
use crate::error::{AppError, AppResult};
use crate::jobs::{Job, JobHandler, JobPayload};
use crate::repository::Store;

pub struct DipGenerationWorker<S: Store> {
    dips: DipService<S>,
}

impl<S: Store> DipGenerationWorker<S> {
    pub fn new(dips: DipService<S>) -> Self {
        Self { dips }
    }

    pub async fn sweep(&self) -> AppResult<usize> {
        self.dips.requeue_missing_dips().await
    }
}

#[async_trait]
impl<S: Store> JobHandler for DipGenerationWorker<S> {
    async fn handle(&self, job: &Job) -> AppResult<()> {
        let JobPayload::GenerateDip(payload) = job.payload else {
            return Err(AppError::Invalid(format!(
                "unexpected job on the DIP queue: {:?}",
                job.payload
            )));
        };

        self.dips.generate_dip(payload.eligibility_id).await?;
        Ok(())
    }
}
