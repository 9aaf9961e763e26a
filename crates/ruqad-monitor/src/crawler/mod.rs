//! Validate-and-publish stage
//!
//! Turns a staging directory into catalog entities. Archive files are
//! registered first, then the directory is scanned, quality summaries are
//! extracted and every record is checked against the data model. The crawl
//! update is only sent when all records pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use ruqad_common::{archive, RuqadError};

pub mod catalog;
pub mod datamodel;
pub mod entity;
pub mod scanner;
pub mod transformers;
pub mod validator;

pub use catalog::{Catalog, CatalogError, CatalogFile, HttpCatalog};
pub use datamodel::DataModel;
pub use entity::{Entity, QualityCheckResult, Role, ELN_RECORD, QUALITY_CHECK};
pub use scanner::{ElnScanner, EntityScanner};
pub use transformers::{cast_metadata_type, TransformError};
pub use validator::{SchemaSet, ValidationEntry, ValidationReport};

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: RuqadError,
    },

    #[error("Invalid metadata in {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Transformer failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Invalid data model: {0}")]
    DataModel(#[from] serde_yaml::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Result of [`ValidateAndPublish::process`]
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// All records passed and the catalog was updated
    pub validated: bool,
    /// One summary per archive, extracted before validation
    pub quality_checks: Vec<QualityCheckResult>,
    pub report: ValidationReport,
}

pub struct ValidateAndPublish {
    catalog: Arc<dyn Catalog>,
    scanner: Arc<dyn EntityScanner>,
    schemas: SchemaSet,
}

impl ValidateAndPublish {
    /// Stage using the built-in scanner and data model
    pub fn new(catalog: Arc<dyn Catalog>) -> Result<Self, CrawlError> {
        let schemas = SchemaSet::from_datamodel(&DataModel::builtin()?);
        Ok(Self {
            catalog,
            scanner: Arc::new(ElnScanner),
            schemas,
        })
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn EntityScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_schemas(mut self, schemas: SchemaSet) -> Self {
        self.schemas = schemas;
        self
    }

    pub async fn process(&self, target_dir: &Path) -> Result<ProcessOutcome, CrawlError> {
        self.register_files(target_dir).await?;

        let entities = self.scanner.scan_directory(target_dir)?;

        let quality_checks = extract_quality_checks(&entities);

        let report = self.schemas.validate(&entities);
        if !report.all_passed() {
            for failure in report.failures() {
                error!(
                    schema = %failure.schema,
                    entity = %failure.entity,
                    errors = %failure.errors.join("; "),
                    "Record failed validation"
                );
            }
            warn!(dir = %target_dir.display(), "Validation failed, catalog not updated");
            return Ok(ProcessOutcome {
                validated: false,
                quality_checks,
                report,
            });
        }

        let prefix = remove_prefix(target_dir);
        self.catalog
            .crawl_update(target_dir, &entities, &prefix)
            .await?;

        info!(
            dir = %target_dir.display(),
            entities = entities.len(),
            quality_checks = quality_checks.len(),
            "Published crawled entities"
        );
        Ok(ProcessOutcome {
            validated: true,
            quality_checks,
            report,
        })
    }

    /// Insert or update a catalog file entity for every archive below `target_dir`
    async fn register_files(&self, target_dir: &Path) -> Result<(), CrawlError> {
        let mut files = Vec::new();
        for suffix in archive::ARCHIVE_SUFFIXES {
            files.extend(scanner::find_files(target_dir, suffix)?);
        }
        files.sort();

        for local in files {
            let path = scanner::relative_path(target_dir, &local);
            match self.catalog.retrieve_file(&path).await? {
                Some(existing) => {
                    info!(path = %path, file_id = existing.id, "Updating file entity");
                    self.catalog.update_file(&existing, &local).await?;
                },
                None => {
                    info!(path = %path, "Inserting file entity");
                    self.catalog.insert_file(&local, &path).await?;
                },
            }
        }

        Ok(())
    }
}

/// Quality summaries of `entities`, warning for every archive without a license
pub fn extract_quality_checks(entities: &[Entity]) -> Vec<QualityCheckResult> {
    let checks: Vec<QualityCheckResult> = entities
        .iter()
        .filter_map(QualityCheckResult::from_entity)
        .collect();

    for check in checks.iter().filter(|c| !c.fair_license_check) {
        warn!(eln_file = %check.eln_file, "Archive does not declare a license");
    }

    checks
}

fn remove_prefix(target_dir: &Path) -> String {
    let dir = target_dir.display().to_string();
    let trimmed = dir.trim_end_matches(std::path::MAIN_SEPARATOR).to_string();
    if trimmed.is_empty() {
        dir
    } else {
        trimmed
    }
}
