//! HTTP client for the repository REST API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{CollectError, ExportError, ExportType, RecordId, RecordPage};
use crate::config::KadiConfig;

/// Record operations consumed by the monitor
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// One page of records, newest first
    async fn list_records(&self, page: u32, per_page: u32) -> Result<RecordPage, CollectError>;

    /// Write an export of `record_id` to `destination`, replacing any existing file
    async fn export_record(
        &self,
        record_id: RecordId,
        export_type: ExportType,
        destination: &Path,
    ) -> Result<(), ExportError>;
}

/// Kadi4Mat API client authenticated with a personal access token
pub struct KadiClient {
    client: Client,
    host: String,
    token: String,
}

impl KadiClient {
    pub fn new(config: &KadiConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("ruqad-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn records_url(&self) -> String {
        format!("{}/api/records", self.host)
    }
}

#[async_trait]
impl RecordRepository for KadiClient {
    #[instrument(skip(self))]
    async fn list_records(&self, page: u32, per_page: u32) -> Result<RecordPage, CollectError> {
        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(&self.token)
            .query(&[
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
                ("sort", "-created_at".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollectError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let page: RecordPage = response.json().await?;
        debug!(
            items = page.items.len(),
            total_pages = page.pagination.total_pages,
            "Fetched record page"
        );
        Ok(page)
    }

    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn export_record(
        &self,
        record_id: RecordId,
        export_type: ExportType,
        destination: &Path,
    ) -> Result<(), ExportError> {
        let url = format!("{}/{}/export/{}", self.records_url(), record_id, export_type);

        let mut response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {},
            StatusCode::NOT_FOUND => return Err(ExportError::RecordNotFound(record_id)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(ExportError::Unsupported {
                    record_id,
                    export_type,
                })
            },
            status => {
                return Err(ExportError::Status {
                    record_id,
                    status: status.as_u16(),
                })
            },
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(record_id, bytes = written, "Export written");
        Ok(())
    }
}
