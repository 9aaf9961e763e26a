//! Schema validation of crawled records

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::datamodel::{DataModel, Datatype, RecordType};
use super::entity::{Entity, Role};

/// Validation schema of one record type
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    obligatory: BTreeMap<String, Datatype>,
    allowed: BTreeMap<String, Datatype>,
}

impl Schema {
    fn from_record_type(name: &str, record_type: &RecordType) -> Self {
        let obligatory: BTreeMap<_, _> = record_type
            .obligatory_properties
            .iter()
            .map(|(k, v)| (k.clone(), v.datatype.clone()))
            .collect();
        let mut allowed = obligatory.clone();
        allowed.extend(
            record_type
                .recommended_properties
                .iter()
                .map(|(k, v)| (k.clone(), v.datatype.clone())),
        );

        Self {
            name: name.to_string(),
            obligatory,
            allowed,
        }
    }

    /// Check `entity` and return every violation found
    pub fn validate(&self, entity: &Entity) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for property in self.obligatory.keys() {
            match entity.property(property) {
                None | Some(Value::Null) => {
                    errors.push(format!("'{}' is a required property", property))
                },
                Some(_) => {},
            }
        }

        for (property, value) in &entity.properties {
            match self.allowed.get(property) {
                None => errors.push(format!(
                    "additional property '{}' is not allowed",
                    property
                )),
                Some(_) if value.is_null() => {},
                Some(datatype) if !matches_datatype(value, datatype) => errors.push(format!(
                    "'{}' is not of type {} (got {})",
                    property, datatype, value
                )),
                Some(_) => {},
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn matches_datatype(value: &Value, datatype: &Datatype) -> bool {
    match datatype {
        Datatype::Text | Datatype::File => value.is_string(),
        Datatype::Integer => value.is_i64() || value.is_u64(),
        Datatype::Double => value.is_number(),
        Datatype::Boolean => value.is_boolean(),
        Datatype::DateTime => value.as_str().is_some_and(is_datetime),
        Datatype::Reference(_) => value.is_string() || value.is_u64(),
        Datatype::List(inner) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|item| matches_datatype(item, inner))),
    }
}

fn is_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Outcome of validating one record against one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEntry {
    pub schema: String,
    pub entity: String,
    pub passed: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub entries: Vec<ValidationEntry>,
}

impl ValidationReport {
    pub fn all_passed(&self) -> bool {
        self.entries.iter().all(|e| e.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationEntry> {
        self.entries.iter().filter(|e| !e.passed)
    }
}

/// One schema per record type of a [`DataModel`]
#[derive(Debug, Clone)]
pub struct SchemaSet {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaSet {
    pub fn from_datamodel(model: &DataModel) -> Self {
        let schemas = model
            .record_types
            .iter()
            .map(|(name, rt)| (name.clone(), Schema::from_record_type(name, rt)))
            .collect();
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Validate every `Record` entity against the schema of each of its parents
    ///
    /// Records without a parent, or with a parent that has no schema, fail.
    /// Entities of other roles are ignored.
    pub fn validate<'a, I>(&self, entities: I) -> ValidationReport
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        let mut report = ValidationReport::default();

        for entity in entities.into_iter().filter(|e| e.role == Role::Record) {
            let name = entity.display_name().to_string();

            if entity.parents.is_empty() {
                report.entries.push(ValidationEntry {
                    schema: String::new(),
                    entity: name,
                    passed: false,
                    errors: vec!["record has no record type".to_string()],
                });
                continue;
            }

            for parent in &entity.parents {
                let entry = match self.get(parent) {
                    Some(schema) => {
                        let result = schema.validate(entity);
                        ValidationEntry {
                            schema: parent.clone(),
                            entity: name.clone(),
                            passed: result.is_ok(),
                            errors: result.err().unwrap_or_default(),
                        }
                    },
                    None => ValidationEntry {
                        schema: parent.clone(),
                        entity: name.clone(),
                        passed: false,
                        errors: vec![format!("no schema for record type '{}'", parent)],
                    },
                };
                debug!(schema = %entry.schema, entity = %entry.entity, passed = entry.passed, "Validated record");
                report.entries.push(entry);
            }
        }

        report
    }
}
