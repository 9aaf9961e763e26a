//! External data-quality pipeline
//!
//! - **poll**: retry primitive with an injectable clock
//! - **gitlab**: pipeline service client
//! - **checker**: upload / trigger / poll / download / cleanup state machine
//!
//! A pipeline that ran and did not pass is an ordinary [`CheckOutcome::Failed`]
//! value. [`QualityCheckError`] is reserved for infrastructure failures.

use std::fmt;
use std::path::PathBuf;

pub mod checker;
pub mod gitlab;
pub mod poll;

pub use checker::{CheckState, QualityChecker, ARTIFACTS_FILE_NAME};
pub use gitlab::{
    GitlabClient, GitlabError, JobId, PipelineId, PipelineJob, PipelineService, PipelineStatus,
};
pub use poll::{poll_until, Clock, PollExhausted, PollPolicy, TokioClock};

/// Result of a quality check that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The pipeline passed; the report bundle was downloaded to `artifact`
    Passed { artifact: PathBuf },
    Failed(FailedCheck),
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed { .. })
    }
}

/// Why the pipeline did not pass, with the last observed status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub pipeline_id: PipelineId,
    /// Status of the run, or of the failing job
    pub status: String,
    pub reason: FailureReason,
    /// Job list as returned by the service; empty when the run itself failed
    pub jobs: Vec<PipelineJob>,
}

impl FailedCheck {
    /// `name=status` pairs of the observed jobs
    pub fn job_summary(&self) -> String {
        self.jobs
            .iter()
            .map(|job| format!("{}={}", job.name, job.status))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PipelineUnsuccessful,
    /// The named job finished with a status other than `success`
    JobUnsuccessful(String),
    /// No job with this exact name in the pipeline
    JobMissing(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PipelineUnsuccessful => f.write_str("pipeline did not succeed"),
            FailureReason::JobUnsuccessful(job) => write!(f, "job '{}' did not succeed", job),
            FailureReason::JobMissing(job) => write!(f, "job '{}' not found", job),
        }
    }
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline {}: {} (status '{}')",
            self.pipeline_id, self.reason, self.status
        )?;
        if !self.jobs.is_empty() {
            write!(f, ", jobs [{}]", self.job_summary())?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QualityCheckError {
    #[error("Failed to set up pipeline client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to trigger pipeline: {0}")]
    Trigger(#[source] GitlabError),

    #[error("Failed to query pipeline: {0}")]
    Poll(#[source] GitlabError),

    #[error("Pipeline did not finish in time: {0}")]
    Timeout(#[from] PollExhausted),

    #[error("Failed to download artifacts of job {job_id}: {source}")]
    ArtifactTransfer {
        job_id: JobId,
        #[source]
        source: GitlabError,
    },

    #[error("Scratch storage operation failed: {0:#}")]
    Storage(anyhow::Error),

    #[error("Failed to unpack archive: {0}")]
    Archive(#[from] ruqad_common::RuqadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
