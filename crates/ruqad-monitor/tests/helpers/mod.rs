//! Test helpers for ruqad-monitor integration tests
//!
//! - zip fixtures for `.eln` exports and report bundles
//! - in-memory fakes for the repository, scratch store, pipeline service
//!   and catalog
//! - a clock that records sleeps instead of waiting
//! - log capture for asserting on emitted warnings
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ruqad_common::timestamp::parse_timestamp;
use ruqad_monitor::crawler::{Catalog, CatalogError, CatalogFile, Entity};
use ruqad_monitor::kadi::types::Pagination;
use ruqad_monitor::kadi::{
    CollectError, ExportError, ExportType, RecordId, RecordPage, RecordRef, RecordRepository,
};
use ruqad_monitor::quality::gitlab::{PipelineJob, PipelineRun};
use ruqad_monitor::quality::{Clock, GitlabError, JobId, PipelineId, PipelineService};
use ruqad_monitor::storage::ScratchStore;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;

// ============================================================================
// Zip fixtures
// ============================================================================

/// Write a zip at `path`. Names ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    let file = std::fs::File::create(path).expect("Failed to create zip fixture");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options)
                .expect("Failed to add directory entry");
        } else {
            zip.start_file(*name, options).expect("Failed to start entry");
            zip.write_all(content.as_bytes())
                .expect("Failed to write entry");
        }
    }
    zip.finish().expect("Failed to finish zip fixture");
}

/// RO-Crate metadata describing a dataset called `title`
pub fn ro_crate_metadata(title: &str) -> String {
    serde_json::json!({
        "@context": "https://w3id.org/ro/crate/1.1/context",
        "@graph": [
            {
                "@id": "ro-crate-metadata.json",
                "@type": "CreativeWork",
                "about": {"@id": "./"},
                "conformsTo": {"@id": "https://w3id.org/ro/crate/1.1"}
            },
            {
                "@id": "./",
                "@type": "Dataset",
                "name": title,
                "description": "Physical measurements of abalone",
                "dateCreated": "2024-11-20T10:00:00+00:00",
                "keywords": "fish, ocean"
            },
            {
                "@id": "files/abalone.csv",
                "@type": "File"
            }
        ]
    })
    .to_string()
}

/// Write an `.eln` export at `path`, optionally declaring a license
pub fn write_eln(path: &Path, title: &str, with_license: bool) {
    let metadata = ro_crate_metadata(title);
    let mut entries = vec![
        ("rec/", ""),
        ("rec/ro-crate-metadata.json", metadata.as_str()),
        ("rec/files/abalone.csv", "sex,length,diameter\nM,0.455,0.365\n"),
    ];
    if with_license {
        entries.push(("rec/LICENSE", "CC-BY-4.0"));
    }
    write_zip(path, &entries);
}

/// Write an `.eln` export without RO-Crate metadata
pub fn write_bare_eln(path: &Path) {
    write_zip(path, &[("rec/files/abalone.csv", "sex,length\nM,0.455\n")]);
}

/// Write a report bundle holding `report/report.json`
pub fn write_report_zip(path: &Path, total: i64, passing: i64) {
    let report = serde_json::json!({
        "numTotalChecks": total,
        "numPassingChecks": passing,
        "checks": []
    })
    .to_string();
    write_zip(path, &[("report/", ""), ("report/report.json", report.as_str())]);
}

/// Staging tree `<root>/ruqad/<id>/{export.eln, report.zip}`
pub fn stage_record(
    root: &Path,
    id: RecordId,
    with_license: bool,
    report: Option<(i64, i64)>,
) -> PathBuf {
    let dir = root.join("ruqad").join(id.to_string());
    write_eln(&dir.join("export.eln"), &format!("Abalone {}", id), with_license);
    if let Some((total, passing)) = report {
        write_report_zip(&dir.join("report.zip"), total, passing);
    }
    dir
}

pub fn ts(value: &str) -> DateTime<Utc> {
    parse_timestamp(value).expect("Invalid test timestamp")
}

// ============================================================================
// Scratch store
// ============================================================================

/// Bucket kept in memory; remembers every key ever uploaded
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub uploaded: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScratchStore for MemoryStore {
    fn bucket(&self) -> &str {
        "memory"
    }

    async fn upload_file(&self, path: &Path, key: &str) -> anyhow::Result<()> {
        let data = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        self.uploaded.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn list_keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.keys())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Clock
// ============================================================================

#[derive(Default)]
pub struct RecordingClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// `MakeWriter` that appends formatted events to a shared buffer
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Subscriber writing plain text into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Repository serving a fixed record list, newest first
///
/// Exports are `.eln` fixtures titled after the record id. Records in
/// `failing` answer exports with 404; `list_error` fails every listing.
#[derive(Default)]
pub struct FakeRepository {
    pub records: Mutex<Vec<RecordRef>>,
    pub failing: BTreeSet<RecordId>,
    pub list_error: bool,
    pub licensed: bool,
    pub list_calls: Mutex<u32>,
    pub exported: Mutex<Vec<RecordId>>,
}

impl FakeRepository {
    pub fn with_records(records: &[(RecordId, &str)]) -> Self {
        let records = records
            .iter()
            .map(|(id, created)| RecordRef {
                id: *id,
                created_at: ts(created),
            })
            .collect();
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn with_failing(mut self, ids: &[RecordId]) -> Self {
        self.failing.extend(ids.iter().copied());
        self
    }

    pub fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }

    pub fn exported(&self) -> Vec<RecordId> {
        self.exported.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordRepository for FakeRepository {
    async fn list_records(&self, page: u32, per_page: u32) -> Result<RecordPage, CollectError> {
        *self.list_calls.lock().unwrap() += 1;
        if self.list_error {
            return Err(CollectError::Status {
                status: 503,
                message: "maintenance".to_string(),
            });
        }

        let records = self.records.lock().unwrap().clone();
        let per_page = per_page.max(1) as usize;
        let total_pages = records.len().div_ceil(per_page) as u32;
        let items = records
            .into_iter()
            .skip((page as usize - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(RecordPage {
            items,
            pagination: Pagination {
                page,
                total_pages,
                total_items: 0,
            },
        })
    }

    async fn export_record(
        &self,
        record_id: RecordId,
        _export_type: ExportType,
        destination: &Path,
    ) -> Result<(), ExportError> {
        self.exported.lock().unwrap().push(record_id);
        if self.failing.contains(&record_id) {
            return Err(ExportError::RecordNotFound(record_id));
        }
        write_eln(destination, &format!("Abalone {}", record_id), self.licensed);
        Ok(())
    }
}

// ============================================================================
// Pipeline service
// ============================================================================

/// Pipeline that succeeds on the first poll and serves a report bundle
pub struct FakePipelines {
    pub total: i64,
    pub passing: i64,
    pub triggered: Mutex<u32>,
}

impl FakePipelines {
    pub fn new(total: i64, passing: i64) -> Self {
        Self {
            total,
            passing,
            triggered: Mutex::new(0),
        }
    }
}

#[async_trait]
impl PipelineService for FakePipelines {
    async fn trigger(&self) -> Result<PipelineId, GitlabError> {
        let mut triggered = self.triggered.lock().unwrap();
        *triggered += 1;
        Ok(u64::from(*triggered))
    }

    async fn pipeline(&self, id: PipelineId) -> Result<PipelineRun, GitlabError> {
        Ok(PipelineRun {
            id,
            status: "success".to_string(),
            finished_at: Some("2024-11-20T10:05:00.000Z".to_string()),
        })
    }

    async fn jobs(&self, _id: PipelineId) -> Result<Vec<PipelineJob>, GitlabError> {
        Ok(vec![
            PipelineJob {
                id: 10,
                name: "evaluate".to_string(),
                status: "success".to_string(),
            },
            PipelineJob {
                id: 11,
                name: "report".to_string(),
                status: "success".to_string(),
            },
        ])
    }

    async fn download_artifacts(&self, _job: JobId, destination: &Path) -> Result<(), GitlabError> {
        write_report_zip(destination, self.total, self.passing);
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// One `crawl_update` call as seen by the catalog
#[derive(Debug, Clone)]
pub struct CrawlCall {
    pub directory: PathBuf,
    pub remove_prefix: String,
    pub entities: Vec<Entity>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    pub files: Mutex<BTreeMap<String, CatalogFile>>,
    pub inserts: Mutex<u32>,
    pub updates: Mutex<u32>,
    pub crawls: Mutex<Vec<CrawlCall>>,
}

impl MemoryCatalog {
    pub fn inserts(&self) -> u32 {
        *self.inserts.lock().unwrap()
    }

    pub fn updates(&self) -> u32 {
        *self.updates.lock().unwrap()
    }

    pub fn crawls(&self) -> Vec<CrawlCall> {
        self.crawls.lock().unwrap().clone()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn retrieve_file(&self, path: &str) -> Result<Option<CatalogFile>, CatalogError> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    async fn insert_file(&self, _local: &Path, path: &str) -> Result<CatalogFile, CatalogError> {
        let mut files = self.files.lock().unwrap();
        let file = CatalogFile {
            id: files.len() as u64 + 1,
            path: path.to_string(),
        };
        files.insert(path.to_string(), file.clone());
        *self.inserts.lock().unwrap() += 1;
        Ok(file)
    }

    async fn update_file(
        &self,
        file: &CatalogFile,
        _local: &Path,
    ) -> Result<CatalogFile, CatalogError> {
        *self.updates.lock().unwrap() += 1;
        Ok(file.clone())
    }

    async fn crawl_update(
        &self,
        directory: &Path,
        entities: &[Entity],
        remove_prefix: &str,
    ) -> Result<(), CatalogError> {
        self.crawls.lock().unwrap().push(CrawlCall {
            directory: directory.to_path_buf(),
            remove_prefix: remove_prefix.to_string(),
            entities: entities.to_vec(),
        });
        Ok(())
    }
}
