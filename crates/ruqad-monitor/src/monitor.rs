//! Polling monitor
//!
//! One cycle: collect records created after the cursor, advance the cursor,
//! then export, quality-check and publish every record in order. The cursor
//! tracks records *observed*, so a record whose processing fails is not
//! picked up again by later cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use ruqad_common::{timestamp::parse_timestamp, RuqadError};

use crate::config::{CycleConfig, MonitorConfig};
use crate::crawler::{HttpCatalog, ProcessOutcome, ValidateAndPublish};
use crate::error::MonitorError;
use crate::kadi::{
    collect_records_created_after, download_eln_for, KadiClient, RecordId, RecordRef,
    RecordRepository,
};
use crate::quality::{CheckOutcome, QualityChecker};

/// Staging sub-directory that mirrors the catalog layout
pub const STAGING_NAMESPACE: &str = "ruqad";
pub const EXPORT_FILE_NAME: &str = "export.eln";
pub const REPORT_FILE_NAME: &str = "report.zip";

/// What to do with the rest of a cycle when one record fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abandon the remaining records of the cycle
    #[default]
    AbortCycle,
    /// Log the failure and move on to the next record
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = RuqadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort-cycle" | "abort" => Ok(FailurePolicy::AbortCycle),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(RuqadError::config(format!(
                "Invalid failure policy '{}' (expected 'abort-cycle' or 'continue')",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::AbortCycle => f.write_str("abort-cycle"),
            FailurePolicy::Continue => f.write_str("continue"),
        }
    }
}

/// Exclusive lower bound of record creation times still to be ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestionCursor(DateTime<Utc>);

impl IngestionCursor {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for IngestionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    cursor: String,
}

/// Cursor persisted as `{"cursor": "<rfc3339>"}`
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored cursor, or `None` when the file does not exist yet
    pub async fn load(&self) -> Result<Option<IngestionCursor>, RuqadError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CursorFile = serde_json::from_str(&contents)?;
        Ok(Some(IngestionCursor::new(parse_timestamp(&file.cursor)?)))
    }

    /// Write to a sibling temp file, then rename over the target
    pub async fn save(&self, cursor: IngestionCursor) -> Result<(), RuqadError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let contents = serde_json::to_string_pretty(&CursorFile {
            cursor: cursor.to_string(),
        })?;

        let target = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), RuqadError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(contents.as_bytes())?;
            tmp.persist(&target).map_err(|e| RuqadError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| RuqadError::Io(std::io::Error::other(e)))?
    }
}

/// Loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_records_per_cycle: usize,
    pub failure_policy: FailurePolicy,
}

impl From<&CycleConfig> for MonitorSettings {
    fn from(config: &CycleConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_records_per_cycle: config.max_records_per_cycle,
            failure_policy: config.failure_policy,
        }
    }
}

/// A record that went through the whole pipeline
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record_id: RecordId,
    /// `None` when quality checks are disabled
    pub quality: Option<CheckOutcome>,
    pub publish: ProcessOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub record_id: RecordId,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub collected: usize,
    /// The batch cap was exceeded and no record was processed
    pub skipped: bool,
    pub processed: Vec<RecordOutcome>,
    pub failures: Vec<RecordFailure>,
}

pub struct Monitor {
    repository: Arc<dyn RecordRepository>,
    checker: Option<QualityChecker>,
    publisher: ValidateAndPublish,
    settings: MonitorSettings,
    cursor_store: Option<CursorStore>,
}

impl Monitor {
    pub fn new(
        repository: Arc<dyn RecordRepository>,
        checker: Option<QualityChecker>,
        publisher: ValidateAndPublish,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            repository,
            checker,
            publisher,
            settings,
            cursor_store: None,
        }
    }

    pub fn with_cursor_store(mut self, store: CursorStore) -> Self {
        self.cursor_store = Some(store);
        self
    }

    /// Wire up the production clients from `config`
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let repository = Arc::new(KadiClient::new(&config.kadi)?);

        let checker = if config.cycle.skip_quality_check {
            info!("Quality checks disabled (SKIP_QUALITY_CHECK is set)");
            None
        } else {
            match (&config.pipeline, &config.storage) {
                (Some(pipeline), Some(storage)) => {
                    Some(QualityChecker::from_config(pipeline, storage.clone())?)
                },
                _ => {
                    return Err(RuqadError::config(
                        "Quality checks are enabled but pipeline or storage settings are missing",
                    )
                    .into())
                },
            }
        };

        let catalog = Arc::new(HttpCatalog::new(&config.catalog)?);
        let publisher = ValidateAndPublish::new(catalog)?;

        let mut monitor = Self::new(
            repository,
            checker,
            publisher,
            MonitorSettings::from(&config.cycle),
        );
        if let Some(path) = &config.cycle.cursor_file {
            monitor = monitor.with_cursor_store(CursorStore::new(path));
        }
        Ok(monitor)
    }

    /// Persisted cursor if there is one, else `start`
    pub async fn initial_cursor(
        &self,
        start: DateTime<Utc>,
    ) -> Result<IngestionCursor, MonitorError> {
        if let Some(store) = &self.cursor_store {
            if let Some(cursor) = store.load().await? {
                info!(cursor = %cursor, path = %store.path().display(), "Resuming from stored cursor");
                return Ok(cursor);
            }
        }
        Ok(IngestionCursor::new(start))
    }

    /// Run one polling cycle that started at `now`
    ///
    /// `cursor` is advanced to `now` as soon as collection succeeds. A
    /// collection failure leaves it untouched.
    #[instrument(skip(self, cursor), fields(start = %cursor))]
    pub async fn run_cycle(
        &self,
        cursor: &mut IngestionCursor,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, MonitorError> {
        info!("Checking for records created after {}", cursor);
        let records = collect_records_created_after(self.repository.as_ref(), cursor.timestamp()).await?;

        *cursor = IngestionCursor::new(now);
        self.persist(*cursor).await;

        let mut report = CycleReport {
            collected: records.len(),
            ..CycleReport::default()
        };

        if records.len() > self.settings.max_records_per_cycle {
            warn!(
                count = records.len(),
                max = self.settings.max_records_per_cycle,
                "Skipping cycle, too many new records"
            );
            report.skipped = true;
            return Ok(report);
        }
        if records.is_empty() {
            info!("No new records");
            return Ok(report);
        }

        for record in &records {
            match self.process_record(record).await {
                Ok(outcome) => report.processed.push(outcome),
                Err(e) => {
                    error!(record_id = record.id, error = %e.chain(), "Record processing failed");
                    if self.settings.failure_policy == FailurePolicy::AbortCycle {
                        return Err(e);
                    }
                    report.failures.push(RecordFailure {
                        record_id: record.id,
                        error: e.chain(),
                    });
                },
            }
        }

        Ok(report)
    }

    /// Export, check and publish one record in its own staging directory
    #[instrument(skip(self, record), fields(record_id = record.id))]
    pub async fn process_record(&self, record: &RecordRef) -> Result<RecordOutcome, MonitorError> {
        let staging = tempfile::Builder::new().prefix("ruqad-").tempdir()?;
        let record_dir = staging
            .path()
            .join(STAGING_NAMESPACE)
            .join(record.id.to_string());
        tokio::fs::create_dir_all(&record_dir).await?;

        let eln = record_dir.join(EXPORT_FILE_NAME);
        download_eln_for(self.repository.as_ref(), record.id, &eln).await?;

        let quality = match &self.checker {
            Some(checker) => {
                let outcome = checker.check(&eln, &record_dir).await?;
                match &outcome {
                    CheckOutcome::Passed { artifact } => {
                        tokio::fs::rename(artifact, record_dir.join(REPORT_FILE_NAME)).await?;
                    },
                    CheckOutcome::Failed(failure) => {
                        warn!(record_id = record.id, failure = %failure, "Publishing without quality report");
                    },
                }
                Some(outcome)
            },
            None => {
                debug!(record_id = record.id, "Skipping quality check");
                None
            },
        };

        let publish = self.publisher.process(staging.path()).await?;
        if !publish.validated {
            warn!(record_id = record.id, "Record metadata rejected by validation");
        }

        Ok(RecordOutcome {
            record_id: record.id,
            quality,
            publish,
        })
    }

    /// Poll until `shutdown` resolves and return the last cursor
    ///
    /// Cycle errors are logged and never end the loop. `shutdown` is honoured
    /// mid-cycle: the in-flight cycle is dropped.
    pub async fn run<F>(&self, start: IngestionCursor, shutdown: F) -> IngestionCursor
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cursor = start;

        loop {
            let now = Utc::now();
            let cancelled = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                result = self.run_cycle(&mut cursor, now) => {
                    match result {
                        Ok(report) => debug!(
                            collected = report.collected,
                            processed = report.processed.len(),
                            failed = report.failures.len(),
                            skipped = report.skipped,
                            "Cycle finished"
                        ),
                        Err(e) => error!(error = %e.chain(), "Cycle failed"),
                    }
                    false
                },
            };
            if cancelled {
                break;
            }

            let cancelled = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = tokio::time::sleep(self.settings.poll_interval) => false,
            };
            if cancelled {
                break;
            }
        }

        info!(cursor = %cursor, "Monitor stopped");
        cursor
    }

    async fn persist(&self, cursor: IngestionCursor) {
        if let Some(store) = &self.cursor_store {
            if let Err(e) = store.save(cursor).await {
                warn!(error = %e, path = %store.path().display(), "Failed to persist cursor");
            }
        }
    }
}
