//! Typed entities produced by a directory scan

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Record type of per-archive quality summaries
pub const QUALITY_CHECK: &str = "QualityCheck";

/// Record type of the record described by an `.eln` export
pub const ELN_RECORD: &str = "ELNRecord";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Record,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Catalog path for `File` entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Entity {
    pub fn record(parent: impl Into<String>) -> Self {
        Self {
            role: Role::Record,
            name: None,
            parents: vec![parent.into()],
            properties: BTreeMap::new(),
            path: None,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().map(str::to_string);
        Self {
            role: Role::File,
            name,
            parents: Vec::new(),
            properties: BTreeMap::new(),
            path: Some(path),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn has_parent(&self, parent: &str) -> bool {
        self.parents.iter().any(|p| p == parent)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Name used in logs and validation reports
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("<unnamed>")
    }
}

/// Quality summary of one archive
///
/// Serialized field names are the catalog property names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheckResult {
    #[serde(rename = "ELNFile")]
    pub eln_file: String,
    #[serde(rename = "FAIRLicenseCheck")]
    pub fair_license_check: bool,
    #[serde(
        rename = "numTotalChecks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub num_total_checks: Option<i64>,
    #[serde(
        rename = "numPassingChecks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub num_passing_checks: Option<i64>,
}

impl QualityCheckResult {
    /// Read the summary back from a `QualityCheck` record
    ///
    /// Returns `None` for any other entity. A missing or non-boolean
    /// license flag reads as `false`.
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        if entity.role != Role::Record || !entity.has_parent(QUALITY_CHECK) {
            return None;
        }

        let eln_file = match entity.property("ELNFile") {
            Some(Value::String(path)) => path.clone(),
            _ => String::new(),
        };

        Some(Self {
            eln_file,
            fair_license_check: entity
                .property("FAIRLicenseCheck")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            num_total_checks: entity.property("numTotalChecks").and_then(Value::as_i64),
            num_passing_checks: entity.property("numPassingChecks").and_then(Value::as_i64),
        })
    }

    pub fn into_entity(self) -> Entity {
        let name = format!("{}/{}", QUALITY_CHECK, self.eln_file);
        let properties = match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mut entity = Entity::record(QUALITY_CHECK).with_name(name);
        entity.properties.extend(properties);
        entity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quality_check_property_names() {
        let entity = QualityCheckResult {
            eln_file: "ruqad/1222/export.eln".to_string(),
            fair_license_check: false,
            num_total_checks: Some(20),
            num_passing_checks: Some(18),
        }
        .into_entity();

        assert!(entity.has_parent(QUALITY_CHECK));
        assert_eq!(entity.property("ELNFile"), Some(&json!("ruqad/1222/export.eln")));
        assert_eq!(entity.property("FAIRLicenseCheck"), Some(&json!(false)));
        assert_eq!(entity.property("numTotalChecks"), Some(&json!(20)));
        assert_eq!(entity.property("numPassingChecks"), Some(&json!(18)));
    }

    #[test]
    fn test_counts_omitted_without_report() {
        let entity = QualityCheckResult {
            eln_file: "a/export.eln".to_string(),
            fair_license_check: true,
            num_total_checks: None,
            num_passing_checks: None,
        }
        .into_entity();

        assert!(entity.property("numTotalChecks").is_none());
        assert!(entity.property("numPassingChecks").is_none());
        assert_eq!(entity.properties.len(), 2);
    }

    #[test]
    fn test_from_entity_ignores_other_records() {
        let record = Entity::record(ELN_RECORD).with_property("FAIRLicenseCheck", true);
        assert!(QualityCheckResult::from_entity(&record).is_none());

        let file = Entity::file("ruqad/1/export.eln");
        assert!(QualityCheckResult::from_entity(&file).is_none());
        assert_eq!(file.display_name(), "export.eln");
    }
}
