//! Waiting on the server's asynchronous jobs.

use providers::{JobStatus, LibraryServer, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JobWaitError {
    #[error("timed out after {waited:?} waiting for job {job_id}")]
    Timeout { job_id: String, waited: Duration },
    #[error("job {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Blocks until a server job settles.
#[async_trait::async_trait]
pub trait JobWaiter: Send + Sync {
    /// `Ok(true)` once the job reaches `status`, `Ok(false)` if it ends in a
    /// different terminal state.
    async fn wait_for_job(&self, job_id: &str, status: JobStatus) -> Result<bool, JobWaitError>;
}

/// Polls `findJob` every `period` until the job settles or `timeout` passes.
#[derive(Clone)]
pub struct PollingJobWaiter {
    server: Arc<dyn LibraryServer>,
    period: Duration,
    timeout: Duration,
}

impl PollingJobWaiter {
    pub fn new(server: Arc<dyn LibraryServer>, period: Duration, timeout: Duration) -> Self {
        Self {
            server,
            period,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl JobWaiter for PollingJobWaiter {
    async fn wait_for_job(&self, job_id: &str, status: JobStatus) -> Result<bool, JobWaitError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        while Instant::now() < deadline {
            let job = self
                .server
                .find_job(job_id)
                .await?
                .ok_or_else(|| JobWaitError::NotFound(job_id.to_string()))?;
            debug!(
                "waiting for job {} status {} progress {:.1}",
                job_id,
                job.status,
                job.progress.unwrap_or(0.0)
            );
            if job.status == status {
                return Ok(true);
            }
            if job.status.is_terminal() {
                return Ok(false);
            }
            tokio::time::sleep(self.period).await;
        }
        Err(JobWaitError::Timeout {
            job_id: job_id.to_string(),
            waited: started.elapsed(),
        })
    }
}
