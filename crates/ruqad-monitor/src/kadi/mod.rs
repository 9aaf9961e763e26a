//! Research-data repository (Kadi4Mat) access
//!
//! - **client**: HTTP client and the [`RecordRepository`] seam
//! - **collector**: "created after cursor" discovery over the paged listing
//! - **exporter**: `.eln` (RO-Crate) export of single records

pub mod client;
pub mod collector;
pub mod exporter;
pub mod types;

pub use client::{KadiClient, RecordRepository};
pub use collector::collect_records_created_after;
pub use exporter::download_eln_for;
pub use types::{ExportType, RecordId, RecordPage, RecordRef};

/// Failure while paging the record listing. Never retried here; the next
/// poll cycle is the retry.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Transient network error while listing records: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Record listing returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

/// Failure while exporting a single record
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Record {0} does not exist")]
    RecordNotFound(RecordId),

    #[error("Export type '{export_type}' is not supported for record {record_id}")]
    Unsupported {
        record_id: RecordId,
        export_type: ExportType,
    },

    #[error("Export of record {record_id} returned HTTP {status}")]
    Status { record_id: RecordId, status: u16 },

    #[error("Export request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
