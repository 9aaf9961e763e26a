//! GitLab CI pipeline service (API v4)

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;

pub type PipelineId = u64;
pub type JobId = u64;

/// Name of the job whose success decides the check
pub const EVALUATE_JOB: &str = "evaluate";

/// Name of the job whose artifacts hold the report
pub const REPORT_JOB: &str = "report";

/// Raw GitLab status string for a successful pipeline or job
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, thiserror::Error)]
pub enum GitlabError {
    #[error("Pipeline service request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to write artifacts: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PipelineStatus {
    /// Map a GitLab status string
    pub fn from_gitlab(status: &str) -> Self {
        match status {
            "running" => PipelineStatus::Running,
            STATUS_SUCCESS => PipelineStatus::Succeeded,
            "failed" | "canceled" | "skipped" => PipelineStatus::Failed,
            // created, waiting_for_resource, preparing, pending, scheduled, manual
            _ => PipelineStatus::Pending,
        }
    }
}

/// `GET /projects/:id/pipelines/:pipeline_id`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineRun {
    pub id: PipelineId,
    pub status: String,
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl PipelineRun {
    /// The run has stopped and GitLab recorded when
    pub fn is_finished(&self) -> bool {
        self.status != "running" && self.finished_at.is_some()
    }

    pub fn state(&self) -> PipelineStatus {
        PipelineStatus::from_gitlab(&self.status)
    }
}

/// One entry of `GET /projects/:id/pipelines/:pipeline_id/jobs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineJob {
    pub id: JobId,
    pub name: String,
    pub status: String,
}

impl PipelineJob {
    pub fn state(&self) -> PipelineStatus {
        PipelineStatus::from_gitlab(&self.status)
    }
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    id: PipelineId,
}

/// Pipeline operations used by the quality check
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Start one pipeline run
    async fn trigger(&self) -> Result<PipelineId, GitlabError>;

    async fn pipeline(&self, id: PipelineId) -> Result<PipelineRun, GitlabError>;

    async fn jobs(&self, id: PipelineId) -> Result<Vec<PipelineJob>, GitlabError>;

    /// Write the artifact archive of `job` to `destination`
    async fn download_artifacts(&self, job: JobId, destination: &Path) -> Result<(), GitlabError>;
}

pub struct GitlabClient {
    client: Client,
    project_url: String,
    pipeline_ref: String,
    pipeline_token: String,
    api_token: String,
}

impl GitlabClient {
    pub fn new(config: &PipelineConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ruqad-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            project_url: format!("{}/projects/{}", config.api_url, config.project_id),
            pipeline_ref: config.pipeline_ref.clone(),
            pipeline_token: config.pipeline_token.clone(),
            api_token: config.api_token.clone(),
        })
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(format!("{}{}", self.project_url, path))
            .header("PRIVATE-TOKEN", &self.api_token)
            .send()
            .await?
            .error_for_status()
    }
}

#[async_trait]
impl PipelineService for GitlabClient {
    #[instrument(skip(self))]
    async fn trigger(&self) -> Result<PipelineId, GitlabError> {
        let response: TriggerResponse = self
            .client
            .post(format!("{}/trigger/pipeline", self.project_url))
            .form(&[
                ("token", self.pipeline_token.as_str()),
                ("ref", self.pipeline_ref.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(pipeline_id = response.id, pipeline_ref = %self.pipeline_ref, "Triggered pipeline");
        Ok(response.id)
    }

    async fn pipeline(&self, id: PipelineId) -> Result<PipelineRun, GitlabError> {
        Ok(self.get(&format!("/pipelines/{}", id)).await?.json().await?)
    }

    async fn jobs(&self, id: PipelineId) -> Result<Vec<PipelineJob>, GitlabError> {
        Ok(self
            .get(&format!("/pipelines/{}/jobs", id))
            .await?
            .json()
            .await?)
    }

    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn download_artifacts(&self, job: JobId, destination: &Path) -> Result<(), GitlabError> {
        let mut response = self.get(&format!("/jobs/{}/artifacts", job)).await?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(job_id = job, bytes = written, "Downloaded job artifacts");
        Ok(())
    }
}
