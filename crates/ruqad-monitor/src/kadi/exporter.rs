//! Record export to `.eln`

use std::path::Path;
use tracing::info;

use super::{ExportError, ExportType, RecordId, RecordRepository};

/// Export the record as an RO-Crate (`.eln`) archive to `path`
///
/// Overwrites `path`. Safe to call again with the same arguments.
pub async fn download_eln_for<R>(
    repository: &R,
    record_id: RecordId,
    path: &Path,
) -> Result<(), ExportError>
where
    R: RecordRepository + ?Sized,
{
    repository
        .export_record(record_id, ExportType::RoCrate, path)
        .await?;

    info!(record_id, path = %path.display(), "Downloaded record export");
    Ok(())
}
