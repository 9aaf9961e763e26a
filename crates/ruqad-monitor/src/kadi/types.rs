//! Repository API payloads

use chrono::{DateTime, Utc};
use ruqad_common::timestamp::serde_flexible;
use serde::Deserialize;

/// Repository record identifier
pub type RecordId = u64;

/// A record seen in the listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordRef {
    pub id: RecordId,
    #[serde(with = "serde_flexible")]
    pub created_at: DateTime<Utc>,
}

/// One page of `GET /api/records`
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub items: Vec<RecordRef>,
    #[serde(rename = "_pagination", default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: u64,
}

/// Export formats offered by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    RoCrate,
}

impl ExportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportType::RoCrate => "ro-crate",
        }
    }
}

impl std::fmt::Display for ExportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
