//! Quality-check state machine
//!
//! `Idle -> Uploaded -> Triggered -> Polling -> {Succeeded | Failed} -> CleanedUp`
//!
//! The scratch bucket is emptied on every exit path, including errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use ruqad_common::archive;

use super::gitlab::{
    GitlabClient, PipelineId, PipelineJob, PipelineService, PipelineStatus, EVALUATE_JOB,
    REPORT_JOB,
};
use super::poll::{poll_until, Clock, PollPolicy, TokioClock};
use super::{CheckOutcome, FailedCheck, FailureReason, QualityCheckError};
use crate::config::PipelineConfig;
use crate::storage::{config::StorageConfig, data_key, ScratchStore, Storage};

/// File name of the downloaded artifact bundle inside the target directory
pub const ARTIFACTS_FILE_NAME: &str = "artifacts.zip";

/// Archive entries with this suffix are metadata and never uploaded
const METADATA_SUFFIX: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Idle,
    Uploaded,
    Triggered,
    Polling,
    Succeeded,
    Failed,
    CleanedUp,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckState::Idle => "idle",
            CheckState::Uploaded => "uploaded",
            CheckState::Triggered => "triggered",
            CheckState::Polling => "polling",
            CheckState::Succeeded => "succeeded",
            CheckState::Failed => "failed",
            CheckState::CleanedUp => "cleaned-up",
        };
        f.write_str(name)
    }
}

pub struct QualityChecker {
    store: Arc<dyn ScratchStore>,
    pipelines: Arc<dyn PipelineService>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl QualityChecker {
    pub fn new(
        store: Arc<dyn ScratchStore>,
        pipelines: Arc<dyn PipelineService>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            store,
            pipelines,
            clock: Arc::new(TokioClock),
            policy,
        }
    }

    /// Replace the clock used between pipeline polls
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Checker talking to GitLab and the S3 scratch bucket
    pub fn from_config(
        pipeline: &PipelineConfig,
        storage: StorageConfig,
    ) -> Result<Self, QualityCheckError> {
        let pipelines = GitlabClient::new(pipeline).map_err(QualityCheckError::Client)?;
        let policy = PollPolicy::fixed(pipeline.poll_interval()).with_deadline(pipeline.max_wait());

        Ok(Self::new(
            Arc::new(Storage::new(storage)),
            Arc::new(pipelines),
            policy,
        ))
    }

    /// Run the external quality pipeline on `archive_path`
    ///
    /// On success the report bundle is at `target_dir/artifacts.zip`.
    pub async fn check(
        &self,
        archive_path: &Path,
        target_dir: &Path,
    ) -> Result<CheckOutcome, QualityCheckError> {
        let mut state = CheckState::Idle;
        info!(archive = %archive_path.display(), "Starting quality check");

        let result = self.drive(archive_path, target_dir, &mut state).await;
        if let Err(e) = &result {
            error!(state = %state, error = %e, "Quality check aborted");
        }

        let cleanup = self.cleanup().await;
        match cleanup {
            Ok(removed) => {
                debug!(from = %state, removed, "State transition to {}", CheckState::CleanedUp);
            },
            Err(e) if result.is_err() => {
                warn!(error = %e, "Scratch cleanup failed after an aborted check");
            },
            Err(e) => return Err(e),
        }

        result
    }

    async fn drive(
        &self,
        archive_path: &Path,
        target_dir: &Path,
        state: &mut CheckState,
    ) -> Result<CheckOutcome, QualityCheckError> {
        let uploaded = self.upload(archive_path).await?;
        transition(state, CheckState::Uploaded);
        debug!(files = uploaded, bucket = self.store.bucket(), "Uploaded data files");

        let pipeline_id = self
            .pipelines
            .trigger()
            .await
            .map_err(QualityCheckError::Trigger)?;
        transition(state, CheckState::Triggered);

        transition(state, CheckState::Polling);
        let run = poll_until(self.clock.as_ref(), &self.policy, |attempt| async move {
            let run = self
                .pipelines
                .pipeline(pipeline_id)
                .await
                .map_err(QualityCheckError::Poll)?;
            debug!(pipeline_id, attempt, status = %run.status, "Polled pipeline");
            Ok::<_, QualityCheckError>(run.is_finished().then_some(run))
        })
        .await?;

        if run.state() != PipelineStatus::Succeeded {
            transition(state, CheckState::Failed);
            return Ok(failed(
                pipeline_id,
                &run.status,
                FailureReason::PipelineUnsuccessful,
                Vec::new(),
            ));
        }

        let jobs = self
            .pipelines
            .jobs(pipeline_id)
            .await
            .map_err(QualityCheckError::Poll)?;

        let Some(evaluate) = find_job(&jobs, EVALUATE_JOB) else {
            transition(state, CheckState::Failed);
            let reason = FailureReason::JobMissing(EVALUATE_JOB.to_string());
            return Ok(failed(pipeline_id, &run.status, reason, jobs));
        };
        if evaluate.state() != PipelineStatus::Succeeded {
            transition(state, CheckState::Failed);
            let status = evaluate.status.clone();
            let reason = FailureReason::JobUnsuccessful(EVALUATE_JOB.to_string());
            return Ok(failed(pipeline_id, &status, reason, jobs));
        }

        let Some(report_job) = find_job(&jobs, REPORT_JOB).map(|job| job.id) else {
            transition(state, CheckState::Failed);
            let reason = FailureReason::JobMissing(REPORT_JOB.to_string());
            return Ok(failed(pipeline_id, &run.status, reason, jobs));
        };

        transition(state, CheckState::Succeeded);
        let artifact = target_dir.join(ARTIFACTS_FILE_NAME);
        tokio::fs::create_dir_all(target_dir).await?;
        self.pipelines
            .download_artifacts(report_job, &artifact)
            .await
            .map_err(|source| QualityCheckError::ArtifactTransfer {
                job_id: report_job,
                source,
            })?;

        info!(pipeline_id, job_id = report_job, artifact = %artifact.display(), "Quality check passed");
        Ok(CheckOutcome::Passed { artifact })
    }

    /// Upload the data files of `archive_path` and return how many were sent
    async fn upload(&self, archive_path: &Path) -> Result<usize, QualityCheckError> {
        if !archive::is_archive(archive_path) {
            let name = archive_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| archive_path.to_path_buf());
            self.store
                .upload_file(archive_path, &data_key(&name))
                .await
                .map_err(QualityCheckError::Storage)?;
            return Ok(1);
        }

        let scratch = tempfile::tempdir()?;
        let entries = archive::extract_all(archive_path, scratch.path())?;

        let mut uploaded = 0;
        for entry in entries.iter().filter(|e| !e.is_dir && !is_metadata(&e.path)) {
            let relative = entry.path.strip_prefix(scratch.path()).unwrap_or(entry.path.as_path());
            self.store
                .upload_file(&entry.path, &data_key(relative))
                .await
                .map_err(QualityCheckError::Storage)?;
            uploaded += 1;
        }

        Ok(uploaded)
    }

    /// Delete every object in the scratch bucket
    async fn cleanup(&self) -> Result<usize, QualityCheckError> {
        let keys = self
            .store
            .list_keys()
            .await
            .map_err(QualityCheckError::Storage)?;

        for key in &keys {
            self.store
                .delete(key)
                .await
                .map_err(QualityCheckError::Storage)?;
        }

        Ok(keys.len())
    }
}

fn transition(state: &mut CheckState, next: CheckState) {
    let current = *state;
    debug!(from = %current, "State transition to {}", next);
    *state = next;
}

fn find_job<'a>(jobs: &'a [PipelineJob], name: &str) -> Option<&'a PipelineJob> {
    jobs.iter().find(|job| job.name == name)
}

fn failed(
    pipeline_id: PipelineId,
    status: &str,
    reason: FailureReason,
    jobs: Vec<PipelineJob>,
) -> CheckOutcome {
    let failure = FailedCheck {
        pipeline_id,
        status: status.to_string(),
        reason,
        jobs,
    };
    warn!(
        pipeline_id,
        status = %failure.status,
        reason = %failure.reason,
        jobs = %failure.job_summary(),
        "Quality check failed"
    );
    CheckOutcome::Failed(failure)
}

fn is_metadata(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == METADATA_SUFFIX)
}
