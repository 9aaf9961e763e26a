//! Catalog data model
//!
//! The model is a YAML map from record type name to its
//! `obligatory_properties` and `recommended_properties`. Every property
//! declares a `datatype`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Data model shipped with the crawler
pub const BUILTIN_DATAMODEL: &str = include_str!("../../resources/datamodel.yaml");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Datatype {
    Text,
    Integer,
    Double,
    Boolean,
    DateTime,
    File,
    /// Reference to any entity, or to a record of the named type
    Reference(Option<String>),
    List(Box<Datatype>),
}

impl FromStr for Datatype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("LIST<").and_then(|rest| rest.strip_suffix('>')) {
            return Ok(Datatype::List(Box::new(inner.parse()?)));
        }

        match s {
            "TEXT" => Ok(Datatype::Text),
            "INTEGER" => Ok(Datatype::Integer),
            "DOUBLE" => Ok(Datatype::Double),
            "BOOLEAN" => Ok(Datatype::Boolean),
            "DATETIME" => Ok(Datatype::DateTime),
            "FILE" => Ok(Datatype::File),
            "REFERENCE" => Ok(Datatype::Reference(None)),
            "" => Err("empty datatype".to_string()),
            name if name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                Ok(Datatype::Reference(Some(name.to_string())))
            },
            other => Err(format!("unknown datatype '{}'", other)),
        }
    }
}

impl TryFrom<String> for Datatype {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datatype::Text => f.write_str("TEXT"),
            Datatype::Integer => f.write_str("INTEGER"),
            Datatype::Double => f.write_str("DOUBLE"),
            Datatype::Boolean => f.write_str("BOOLEAN"),
            Datatype::DateTime => f.write_str("DATETIME"),
            Datatype::File => f.write_str("FILE"),
            Datatype::Reference(None) => f.write_str("REFERENCE"),
            Datatype::Reference(Some(name)) => f.write_str(name),
            Datatype::List(inner) => write!(f, "LIST<{}>", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyDef {
    pub datatype: Datatype,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordType {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub obligatory_properties: BTreeMap<String, PropertyDef>,
    #[serde(default)]
    pub recommended_properties: BTreeMap<String, PropertyDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DataModel {
    pub record_types: BTreeMap<String, RecordType>,
}

impl DataModel {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn builtin() -> Result<Self, serde_yaml::Error> {
        Self::from_yaml(BUILTIN_DATAMODEL)
    }
}
