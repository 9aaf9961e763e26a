//! Discovery of records created after a cursor

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{CollectError, RecordRef, RecordRepository};
use crate::config::KADI_PAGE_SIZE;

/// Collect all records created strictly after `cursor`
///
/// Pages through the listing sorted by creation time, newest first, and stops
/// at the first record with `created_at <= cursor`. Nothing after that record
/// can qualify, so the remaining pages are never requested. Records are
/// returned in discovery order.
pub async fn collect_records_created_after<R>(
    repository: &R,
    cursor: DateTime<Utc>,
) -> Result<Vec<RecordRef>, CollectError>
where
    R: RecordRepository + ?Sized,
{
    let mut records = Vec::new();
    let mut page_number = 1;

    loop {
        let page = repository.list_records(page_number, KADI_PAGE_SIZE).await?;
        debug!(page = page_number, items = page.items.len(), "Scanning record page");

        if page.items.is_empty() {
            break;
        }

        let mut reached_cursor = false;
        for record in page.items {
            if record.created_at <= cursor {
                reached_cursor = true;
                break;
            }
            records.push(record);
        }

        if reached_cursor || page_number >= page.pagination.total_pages {
            break;
        }
        page_number += 1;
    }

    info!(count = records.len(), cursor = %cursor, "Collected new records");
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::kadi::types::Pagination;
    use crate::kadi::{ExportError, ExportType, RecordId, RecordPage};
    use async_trait::async_trait;
    use ruqad_common::timestamp::parse_timestamp;
    use std::path::Path;
    use std::sync::Mutex;

    /// Serves fixed pages and records which pages were requested
    struct FixedPages {
        pages: Vec<Vec<RecordRef>>,
        requested: Mutex<Vec<u32>>,
    }

    impl FixedPages {
        fn new(pages: Vec<Vec<(RecordId, &str)>>) -> Self {
            let pages = pages
                .into_iter()
                .map(|items| {
                    items
                        .into_iter()
                        .map(|(id, ts)| RecordRef {
                            id,
                            created_at: parse_timestamp(ts).unwrap(),
                        })
                        .collect()
                })
                .collect();
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordRepository for FixedPages {
        async fn list_records(&self, page: u32, _per_page: u32) -> Result<RecordPage, CollectError> {
            self.requested.lock().unwrap().push(page);
            let items = self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(RecordPage {
                items,
                pagination: Pagination {
                    page,
                    total_pages: self.pages.len() as u32,
                    total_items: 0,
                },
            })
        }

        async fn export_record(
            &self,
            _record_id: RecordId,
            _export_type: ExportType,
            _destination: &Path,
        ) -> Result<(), ExportError> {
            unreachable!("collector never exports")
        }
    }

    fn two_pages() -> FixedPages {
        FixedPages::new(vec![
            vec![
                (1, "2024-01-02 01:00:00.000000+00:00"),
                (2, "2024-01-02 01:00:00.000000+00:00"),
            ],
            vec![
                (3, "2024-01-01 01:00:00.000000+00:00"),
                (4, "2024-01-01 01:00:00.000000+00:00"),
            ],
        ])
    }

    fn ids(records: &[RecordRef]) -> Vec<RecordId> {
        records.iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn test_cursor_between_pages() {
        let repo = two_pages();
        let cursor = parse_timestamp("2024-01-01 03:00:00.000000+00:00").unwrap();

        let records = collect_records_created_after(&repo, cursor).await.unwrap();

        assert_eq!(ids(&records), vec![1, 2]);
        assert_eq!(*repo.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_equal_timestamp_is_excluded() {
        let repo = two_pages();
        let cursor = parse_timestamp("2024-01-02 01:00:00+00:00").unwrap();

        let records = collect_records_created_after(&repo, cursor).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(*repo.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_cursor_before_everything_walks_all_pages() {
        let repo = two_pages();
        let cursor = parse_timestamp("1990-01-01T00:00:00+00:00").unwrap();

        let records = collect_records_created_after(&repo, cursor).await.unwrap();

        assert_eq!(ids(&records), vec![1, 2, 3, 4]);
        assert_eq!(*repo.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stops_at_first_disqualifying_item() {
        // Out-of-order item after an old one must not be picked up.
        let repo = FixedPages::new(vec![vec![
            (7, "2024-03-01T00:00:00+00:00"),
            (6, "2024-01-01T00:00:00+00:00"),
            (5, "2024-04-01T00:00:00+00:00"),
        ]]);
        let cursor = parse_timestamp("2024-02-01T00:00:00+00:00").unwrap();

        let records = collect_records_created_after(&repo, cursor).await.unwrap();

        assert_eq!(ids(&records), vec![7]);
    }

    #[tokio::test]
    async fn test_repeated_collection_is_stable() {
        let repo = two_pages();
        let cursor = parse_timestamp("2024-01-01 03:00:00+00:00").unwrap();

        let first = collect_records_created_after(&repo, cursor).await.unwrap();
        let second = collect_records_created_after(&repo, cursor).await.unwrap();

        assert_eq!(first, second);
    }
}
