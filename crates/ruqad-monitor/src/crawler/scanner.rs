//! Directory scanner for exported `.eln` archives
//!
//! Extraction rules:
//! - every directory holding an `.eln` file describes one record
//! - the `.eln` root dataset in `ro-crate-metadata.json` becomes an `ELNRecord`
//! - an entry named `LICENSE`/`LICENCE` (any case, any extension) with content
//!   is the license declaration
//! - a `.zip` next to the `.eln` is the quality report bundle; its
//!   `report.json` holds the check counts
//! - one `QualityCheck` record per `.eln`, one `File` per `.eln`/`.zip`

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use ruqad_common::archive::{entry_file_name, ArchiveReader};
use ruqad_common::RuqadError;

use super::entity::{Entity, QualityCheckResult, ELN_RECORD};
use super::transformers::cast_metadata_type;
use super::CrawlError;

const RO_CRATE_METADATA: &str = "ro-crate-metadata.json";
const REPORT_FILE: &str = "report.json";
const LICENSE_STEMS: [&str; 2] = ["license", "licence"];

/// Report fields cast to integers during extraction
const INTEGER_REPORT_FIELDS: [&str; 2] = ["numTotalChecks", "numPassingChecks"];

/// Turns a directory into typed entities
pub trait EntityScanner: Send + Sync {
    fn scan_directory(&self, dir: &Path) -> Result<Vec<Entity>, CrawlError>;
}

/// Scanner for the `<record>/{export.eln, report.zip}` layout
#[derive(Debug, Clone, Copy, Default)]
pub struct ElnScanner;

impl EntityScanner for ElnScanner {
    fn scan_directory(&self, dir: &Path) -> Result<Vec<Entity>, CrawlError> {
        let mut entities = Vec::new();

        for eln in find_files(dir, "eln")? {
            entities.extend(scan_record(dir, &eln)?);
        }

        info!(
            dir = %dir.display(),
            entities = entities.len(),
            "Scanned directory"
        );
        Ok(entities)
    }
}

/// Files below `dir` with the given extension, in path order
pub(crate) fn find_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, CrawlError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(extension)
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Path of `file` relative to `root`, `/`-separated
pub(crate) fn relative_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn scan_record(root: &Path, eln: &Path) -> Result<Vec<Entity>, CrawlError> {
    let eln_path = relative_path(root, eln);
    debug!(eln_file = %eln_path, "Scanning archive");

    let archive_error = |source: RuqadError| CrawlError::Archive {
        path: eln.to_path_buf(),
        source,
    };
    let mut reader = ArchiveReader::open(eln).map_err(archive_error)?;

    let metadata = match reader.find(RO_CRATE_METADATA).map(str::to_string) {
        Some(name) => Some(reader.read(&name).map_err(archive_error)?),
        None => None,
    };
    let fair_license_check = has_license(&mut reader).map_err(archive_error)?;

    let mut entities = vec![Entity::file(eln_path.clone())];

    let record = eln_record(metadata.as_deref(), &eln_path).map_err(|source| {
        CrawlError::Metadata {
            path: eln.to_path_buf(),
            source,
        }
    })?;
    entities.push(record);

    let mut quality = QualityCheckResult {
        eln_file: eln_path.clone(),
        fair_license_check,
        num_total_checks: None,
        num_passing_checks: None,
    };

    let parent = eln.parent().unwrap_or(root);
    let mut report_found = false;
    for bundle in sibling_zips(parent)? {
        entities.push(Entity::file(relative_path(root, &bundle)));

        if report_found {
            continue;
        }
        if let Some(counts) = read_report(&bundle)? {
            report_found = true;
            quality.num_total_checks = counts.get("numTotalChecks").copied();
            quality.num_passing_checks = counts.get("numPassingChecks").copied();
        }
    }

    entities.push(quality.into_entity());
    Ok(entities)
}

fn sibling_zips(dir: &Path) -> Result<Vec<PathBuf>, CrawlError> {
    let mut zips = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("zip")
        {
            zips.push(entry.into_path());
        }
    }
    Ok(zips)
}

/// Entry named `LICENSE`/`LICENCE` in any case, with or without extension
pub fn is_license_entry(name: &str) -> bool {
    let file_name = entry_file_name(name);
    let stem = file_name
        .split_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
        .to_ascii_lowercase();
    LICENSE_STEMS.contains(&stem.as_str())
}

/// A license entry exists and is not blank
pub fn has_license(reader: &mut ArchiveReader) -> ruqad_common::Result<bool> {
    let candidates: Vec<String> = reader
        .names()
        .iter()
        .filter(|name| is_license_entry(name))
        .cloned()
        .collect();

    for name in candidates {
        if reader.has_content(&name)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn eln_record(metadata: Option<&[u8]>, eln_path: &str) -> Result<Entity, serde_json::Error> {
    let mut record = Entity::record(ELN_RECORD).with_property("ELNFile", eln_path);

    let Some(metadata) = metadata else {
        debug!(eln_file = %eln_path, "Archive has no RO-Crate metadata");
        return Ok(record.with_name(eln_path));
    };

    let crate_json: Value = serde_json::from_slice(metadata)?;
    let Some(root) = root_dataset(&crate_json) else {
        return Ok(record.with_name(eln_path));
    };

    if let Some(title) = root.get("name").and_then(Value::as_str) {
        record = record.with_name(title).with_property("title", title);
    } else {
        record = record.with_name(eln_path);
    }
    if let Some(description) = root.get("description").and_then(Value::as_str) {
        record = record.with_property("description", description);
    }
    if let Some(license) = root.get("license").and_then(id_or_string) {
        record = record.with_property("license", license);
    }
    if let Some(created) = root.get("dateCreated").and_then(Value::as_str) {
        record = record.with_property("dateCreated", created);
    }
    if let Some(words) = root.get("keywords").and_then(keywords) {
        record = record.with_property("keywords", words);
    }

    Ok(record)
}

/// Root data entity: the one the metadata descriptor is `about`, else `./`
fn root_dataset(crate_json: &Value) -> Option<&Value> {
    let graph = crate_json.get("@graph")?.as_array()?;
    let root_id = node_by_id(graph, RO_CRATE_METADATA)
        .and_then(|descriptor| descriptor.get("about"))
        .and_then(id_or_string)
        .unwrap_or_else(|| "./".to_string());

    node_by_id(graph, &root_id)
}

fn node_by_id<'a>(graph: &'a [Value], id: &str) -> Option<&'a Value> {
    graph
        .iter()
        .find(|node| node.get("@id").and_then(Value::as_str) == Some(id))
}

fn id_or_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("@id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn keywords(value: &Value) -> Option<Vec<String>> {
    let words: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|w| w.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|w| w.trim().to_string())
            .collect(),
        _ => return None,
    };
    let words: Vec<String> = words.into_iter().filter(|w| !w.is_empty()).collect();
    (!words.is_empty()).then_some(words)
}

/// Integer check counts from the first `report.json` in `bundle`
fn read_report(bundle: &Path) -> Result<Option<BTreeMap<&'static str, i64>>, CrawlError> {
    let archive_error = |source: RuqadError| CrawlError::Archive {
        path: bundle.to_path_buf(),
        source,
    };
    let mut reader = ArchiveReader::open(bundle).map_err(archive_error)?;

    let Some(name) = reader.find(REPORT_FILE).map(str::to_string) else {
        debug!(bundle = %bundle.display(), "No report in bundle");
        return Ok(None);
    };
    let content = reader.read(&name).map_err(archive_error)?;

    let report: Value = serde_json::from_slice(&content).map_err(|source| CrawlError::Metadata {
        path: bundle.to_path_buf(),
        source,
    })?;

    let mut counts = BTreeMap::new();
    for field in INTEGER_REPORT_FIELDS {
        let Some(raw) = report.get(field) else {
            continue;
        };
        let parameters: BTreeMap<String, String> = [
            ("out_type", "int"),
            ("var_name", field),
            ("var_value", field),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let cast = cast_metadata_type(raw, &parameters)?;
        if let Some(n) = cast.as_i64() {
            counts.insert(field, n);
        }
    }

    Ok(Some(counts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_license_entry_names() {
        assert!(is_license_entry("rec/LICENSE"));
        assert!(is_license_entry("rec/files/licence.txt"));
        assert!(is_license_entry("License.md"));
        assert!(!is_license_entry("rec/data.csv"));
        assert!(!is_license_entry("rec/license-notes.md"));
    }

    #[test]
    fn test_root_dataset_follows_descriptor() {
        let crate_json = json!({
            "@graph": [
                {"@id": "ro-crate-metadata.json", "about": {"@id": "./rec/"}},
                {"@id": "./", "name": "wrapper"},
                {"@id": "./rec/", "name": "Abalone", "keywords": "fish, ocean"}
            ]
        });

        let root = root_dataset(&crate_json).unwrap();
        assert_eq!(root["name"], "Abalone");
        assert_eq!(
            keywords(&root["keywords"]).unwrap(),
            vec!["fish".to_string(), "ocean".to_string()]
        );
    }

    #[test]
    fn test_record_without_metadata_has_no_title() {
        let record = eln_record(None, "ruqad/1/export.eln").unwrap();
        assert!(record.property("title").is_none());
        assert_eq!(record.display_name(), "ruqad/1/export.eln");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/tmp/x"), Path::new("/tmp/x/ruqad/1/export.eln")),
            "ruqad/1/export.eln"
        );
    }
}
