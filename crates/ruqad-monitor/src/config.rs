//! Configuration management
//!
//! Everything is read from the process environment (a `.env` file is
//! honoured). Secrets are collected first so that a misconfigured deployment
//! reports every missing variable at once instead of one per restart.

use chrono::{DateTime, Utc};
use ruqad_common::{timestamp::parse_timestamp, Result, RuqadError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::monitor::FailurePolicy;
use crate::storage::config::StorageConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Sleep between two polling cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Cycles that collect more records than this skip record processing.
pub const DEFAULT_MAX_RECORDS_PER_CYCLE: usize = 5;

/// Interval between two pipeline status requests.
pub const DEFAULT_PIPELINE_POLL_SECS: u64 = 1;

/// Cursor used when nothing else is configured or persisted.
pub const DEFAULT_START_CURSOR: &str = "1990-01-01T02:34:42.484312+00:00";

/// Page size for the record listing.
pub const KADI_PAGE_SIZE: u32 = 100;

/// Timeout for a single repository request.
pub const DEFAULT_KADI_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_GITLAB_API_URL: &str = "https://gitlab.indiscale.com/api/v4";
pub const DEFAULT_GITLAB_PROJECT_ID: &str = "268";
pub const DEFAULT_GITLAB_PIPELINE_REF: &str = "ruqad";

pub const DEFAULT_CATALOG_URL: &str = "http://localhost:10080";

const REDACTED: &str = "<redacted>";

/// Research-data repository connection
#[derive(Clone, Serialize, Deserialize)]
pub struct KadiConfig {
    pub host: String,
    pub token: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for KadiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KadiConfig")
            .field("host", &self.host)
            .field("token", &REDACTED)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// External quality pipeline (GitLab) connection
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub api_url: String,
    pub project_id: String,
    pub pipeline_ref: String,
    pub pipeline_token: String,
    pub api_token: String,
    pub poll_interval_secs: u64,
    /// `None` polls until the pipeline reaches a terminal state
    pub max_wait_secs: Option<u64>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("pipeline_ref", &self.pipeline_ref)
            .field("pipeline_token", &REDACTED)
            .field("api_token", &REDACTED)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_wait_secs", &self.max_wait_secs)
            .finish()
    }
}

/// Catalog service connection
#[derive(Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub url: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Monitor loop behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    pub poll_interval_secs: u64,
    pub max_records_per_cycle: usize,
    pub skip_quality_check: bool,
    pub failure_policy: FailurePolicy,
    pub cursor_file: Option<PathBuf>,
    pub start_cursor: DateTime<Utc>,
}

/// Full daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub kadi: KadiConfig,
    /// Absent when quality checks are skipped
    pub pipeline: Option<PipelineConfig>,
    /// Absent when quality checks are skipped
    pub storage: Option<StorageConfig>,
    pub catalog: CatalogConfig,
    pub cycle: CycleConfig,
}

/// Reads variables and remembers which required ones are missing
#[derive(Default)]
pub(crate) struct EnvReader {
    missing: Vec<String>,
}

impl EnvReader {
    pub(crate) fn required(&mut self, name: &str) -> String {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                warn!(variable = name, "This environment variable is missing");
                self.missing.push(name.to_string());
                String::new()
            },
        }
    }

    pub(crate) fn optional(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    pub(crate) fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    pub(crate) fn parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        self.optional(name)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    pub(crate) fn finish(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(RuqadError::MissingEnv(self.missing))
        }
    }
}

impl KadiConfig {
    pub fn from_env() -> Result<Self> {
        let mut env = EnvReader::default();
        let config = Self::read(&mut env);
        env.finish()?;
        Ok(config)
    }

    pub(crate) fn read(env: &mut EnvReader) -> Self {
        Self {
            host: env.required("KADIHOST").trim_end_matches('/').to_string(),
            token: env.required("KADITOKEN"),
            timeout_secs: env.parsed("KADI_TIMEOUT_SECS", DEFAULT_KADI_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut env = EnvReader::default();
        let config = Self::read(&mut env);
        env.finish()?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn read(env: &mut EnvReader) -> Self {
        Self {
            api_url: env
                .or("GITLAB_API_URL", DEFAULT_GITLAB_API_URL)
                .trim_end_matches('/')
                .to_string(),
            project_id: env.or("GITLAB_PROJECT_ID", DEFAULT_GITLAB_PROJECT_ID),
            pipeline_ref: env.or("GITLAB_PIPELINE_REF", DEFAULT_GITLAB_PIPELINE_REF),
            pipeline_token: env.required("GITLAB_PIPELINE_TOKEN"),
            api_token: env.required("GITLAB_API_TOKEN"),
            poll_interval_secs: env.parsed("RUQAD_PIPELINE_POLL_SECS", DEFAULT_PIPELINE_POLL_SECS),
            max_wait_secs: env
                .optional("RUQAD_PIPELINE_MAX_WAIT_SECS")
                .and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(RuqadError::config(
                "RUQAD_PIPELINE_POLL_SECS must be greater than 0",
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err(RuqadError::config("GITLAB_PROJECT_ID cannot be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        let env = EnvReader::default();
        Self {
            url: env
                .or("CATALOG_URL", DEFAULT_CATALOG_URL)
                .trim_end_matches('/')
                .to_string(),
            token: env.optional("CATALOG_TOKEN"),
        }
    }
}

impl CycleConfig {
    pub(crate) fn read(env: &EnvReader) -> Result<Self> {
        let failure_policy = match env.optional("RUQAD_FAILURE_POLICY") {
            Some(raw) => raw.parse()?,
            None => FailurePolicy::default(),
        };
        let start_cursor = parse_timestamp(&env.or("RUQAD_START_CURSOR", DEFAULT_START_CURSOR))?;

        Ok(Self {
            poll_interval_secs: env.parsed("RUQAD_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            max_records_per_cycle: env
                .parsed("RUQAD_MAX_RECORDS_PER_CYCLE", DEFAULT_MAX_RECORDS_PER_CYCLE),
            skip_quality_check: std::env::var_os("SKIP_QUALITY_CHECK").is_some(),
            failure_policy,
            cursor_file: env.optional("RUQAD_CURSOR_FILE").map(PathBuf::from),
            start_cursor,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl MonitorConfig {
    /// Load the daemon configuration from `.env` and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut env = EnvReader::default();
        let cycle = CycleConfig::read(&env)?;
        let kadi = KadiConfig::read(&mut env);

        let (pipeline, storage) = if cycle.skip_quality_check {
            (None, None)
        } else {
            (
                Some(PipelineConfig::read(&mut env)),
                Some(StorageConfig::read(&mut env)),
            )
        };
        env.finish()?;

        let config = Self {
            kadi,
            pipeline,
            storage,
            catalog: CatalogConfig::from_env(),
            cycle,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle.poll_interval_secs == 0 {
            return Err(RuqadError::config(
                "RUQAD_POLL_INTERVAL_SECS must be greater than 0",
            ));
        }
        if self.cycle.max_records_per_cycle == 0 {
            return Err(RuqadError::config(
                "RUQAD_MAX_RECORDS_PER_CYCLE must be greater than 0",
            ));
        }
        if let Some(pipeline) = &self.pipeline {
            pipeline.validate()?;
        }
        if self.kadi.timeout_secs == 0 {
            warn!("KADI_TIMEOUT_SECS is 0, repository requests will time out immediately");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_start_cursor_parses() {
        let cursor = parse_timestamp(DEFAULT_START_CURSOR).unwrap();
        assert_eq!(cursor.timestamp(), 631_161_282);
    }

    #[test]
    fn test_pipeline_validate_rejects_zero_interval() {
        let config = PipelineConfig {
            api_url: DEFAULT_GITLAB_API_URL.to_string(),
            project_id: DEFAULT_GITLAB_PROJECT_ID.to_string(),
            pipeline_ref: DEFAULT_GITLAB_PIPELINE_REF.to_string(),
            pipeline_token: "t".to_string(),
            api_token: "a".to_string(),
            poll_interval_secs: 0,
            max_wait_secs: None,
        };
        assert!(config.validate().is_err());
    }
}
