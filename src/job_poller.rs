use std::{path::Path, sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use serde_derive::Serialize;

use crate::{
    clock::Clock,
    cups_client::{JobId, JobStatus, Spooler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Completed,
    /// Submitted, but the spooler's answer carried no job id to follow.
    Queued,
    /// The submission command itself failed.
    Rejected,
    Aborted,
    Canceled,
    Stopped,
    /// The job disappeared or its status could not be queried.
    Vanished,
    TimedOut,
}

impl JobOutcome {
    pub fn succeeded(self) -> bool {
        matches!(self, JobOutcome::Completed | JobOutcome::Queued)
    }
}

/// What is kept of a job once it reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintJob {
    pub job_id: Option<JobId>,
    pub outcome: JobOutcome,
}

impl PrintJob {
    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// Submits one file and follows the job until it is done, failed or too slow.
#[derive(Clone)]
pub struct JobPoller {
    spooler: Arc<dyn Spooler>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    timeout: Duration,
}

impl JobPoller {
    pub fn new(spooler: Arc<dyn Spooler>, clock: Arc<dyn Clock>, poll_interval: Duration, timeout: Duration) -> Self {
        Self { spooler, clock, poll_interval, timeout }
    }

    pub fn submit_and_wait(&self, queue: &str, image: &Path, options: &[String]) -> bool {
        self.submit(queue, image, options).succeeded()
    }

    pub fn submit(&self, queue: &str, image: &Path, options: &[String]) -> PrintJob {
        let job_id = match self.spooler.submit_job(queue, options, image) {
            Ok(Some(job_id)) => job_id,
            Ok(None) => {
                warn!("Print job for {} submitted to {queue} without a readable job id, assuming queued", image.display());
                return PrintJob { job_id: None, outcome: JobOutcome::Queued };
            }
            Err(e) => {
                error!("Print command failed: {e}");
                return PrintJob { job_id: None, outcome: JobOutcome::Rejected };
            }
        };

        info!("Print job {job_id} queued successfully");
        let outcome = self.wait(&job_id);
        match outcome {
            JobOutcome::Completed => info!("Print job {job_id} completed successfully"),
            _ => {
                error!("Print job {job_id} failed: {outcome:?}");
                self.log_spooler_errors(&job_id);
            }
        }

        PrintJob { job_id: Some(job_id), outcome }
    }

    /// Returns within `timeout + poll_interval` whatever the spooler answers.
    fn wait(&self, job_id: &JobId) -> JobOutcome {
        let started = self.clock.now();

        loop {
            match self.spooler.job_status(job_id) {
                Ok(JobStatus::Pending) => {}
                Ok(JobStatus::Completed) => return JobOutcome::Completed,
                Ok(JobStatus::Aborted) => return JobOutcome::Aborted,
                Ok(JobStatus::Canceled) => return JobOutcome::Canceled,
                Ok(JobStatus::Stopped) => return JobOutcome::Stopped,
                Ok(JobStatus::Missing) => return JobOutcome::Vanished,
                Err(e) => {
                    error!("Could not query status of print job {job_id}: {e}");
                    return JobOutcome::Vanished;
                }
            }

            if self.clock.now().duration_since(started) >= self.timeout {
                return JobOutcome::TimedOut;
            }
            self.clock.sleep(self.poll_interval);
        }
    }

    fn log_spooler_errors(&self, job_id: &JobId) {
        match self.spooler.error_log_lines(job_id) {
            Ok(lines) => {
                for line in lines {
                    warn!("CUPS: {line}");
                }
            }
            Err(e) => debug!("No spooler log for job {job_id}: {e}"),
        }
    }
}
