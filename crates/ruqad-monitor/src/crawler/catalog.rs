//! Catalog service client
//!
//! File entities are registered one by one. Crawled entities are sent in a
//! single update request so the catalog applies them together.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::entity::Entity;
use crate::config::CatalogConfig;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Catalog {operation} returned HTTP {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Failed to read file for catalog upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A file entity as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub id: u64,
    pub path: String,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a file entity by catalog path
    async fn retrieve_file(&self, path: &str) -> Result<Option<CatalogFile>, CatalogError>;

    /// Create a file entity at `path` with the contents of `local`
    async fn insert_file(&self, local: &Path, path: &str) -> Result<CatalogFile, CatalogError>;

    /// Replace the contents of an existing file entity
    async fn update_file(
        &self,
        file: &CatalogFile,
        local: &Path,
    ) -> Result<CatalogFile, CatalogError>;

    /// Insert or update `entities` crawled from `directory`
    ///
    /// `remove_prefix` is stripped from local paths to form catalog paths.
    async fn crawl_update(
        &self,
        directory: &Path,
        entities: &[Entity],
        remove_prefix: &str,
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Serialize)]
struct CrawlUpdateRequest<'a> {
    directory: String,
    remove_prefix: &'a str,
    entities: &'a [Entity],
}

/// Catalog reached over its REST API
pub struct HttpCatalog {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ruqad-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn files_url(&self) -> String {
        format!("{}/api/files", self.base_url)
    }
}

async fn expect_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(CatalogError::Status {
        operation,
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn retrieve_file(&self, path: &str) -> Result<Option<CatalogFile>, CatalogError> {
        let response = self
            .authorized(self.client.get(self.files_url()))
            .query(&[("path", path)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file = expect_success(response, "retrieve").await?.json().await?;
        Ok(Some(file))
    }

    #[instrument(skip(self, local))]
    async fn insert_file(&self, local: &Path, path: &str) -> Result<CatalogFile, CatalogError> {
        let body = tokio::fs::read(local).await?;
        let response = self
            .authorized(self.client.post(self.files_url()))
            .query(&[("path", path)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let file: CatalogFile = expect_success(response, "insert").await?.json().await?;
        debug!(file_id = file.id, "Inserted file entity");
        Ok(file)
    }

    #[instrument(skip(self, local), fields(file_id = file.id))]
    async fn update_file(
        &self,
        file: &CatalogFile,
        local: &Path,
    ) -> Result<CatalogFile, CatalogError> {
        let body = tokio::fs::read(local).await?;
        let response = self
            .authorized(
                self.client
                    .put(format!("{}/{}", self.files_url(), file.id)),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        Ok(expect_success(response, "update").await?.json().await?)
    }

    #[instrument(skip(self, entities), fields(count = entities.len()))]
    async fn crawl_update(
        &self,
        directory: &Path,
        entities: &[Entity],
        remove_prefix: &str,
    ) -> Result<(), CatalogError> {
        let request = CrawlUpdateRequest {
            directory: directory.display().to_string(),
            remove_prefix,
            entities,
        };

        let response = self
            .authorized(self.client.post(format!("{}/api/crawl", self.base_url)))
            .json(&request)
            .send()
            .await?;
        expect_success(response, "crawl update").await?;

        info!(directory = %directory.display(), "Catalog updated");
        Ok(())
    }
}
