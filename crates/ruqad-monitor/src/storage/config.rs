use serde::{Deserialize, Serialize};

use crate::config::EnvReader;

pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_S3_BUCKET: &str = "ruqad";

/// Scratch bucket connection. Credentials have no defaults.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    pub fn from_env() -> ruqad_common::Result<Self> {
        let mut env = EnvReader::default();
        let config = Self::read(&mut env);
        env.finish()?;
        Ok(config)
    }

    pub(crate) fn read(env: &mut EnvReader) -> Self {
        Self {
            endpoint: env.optional("S3_ENDPOINT"),
            region: env.or("S3_REGION", DEFAULT_S3_REGION),
            bucket: env.or("S3_BUCKET", DEFAULT_S3_BUCKET),
            access_key: env.required("S3_ACCESS_KEY_ID"),
            secret_key: env.required("S3_SECRET_ACCESS_KEY"),
            path_style: env.parsed("S3_PATH_STYLE", true),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "scratch");
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
        assert_eq!(config.bucket, "scratch");
        assert!(config.path_style);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = StorageConfig::for_minio("http://localhost:9000", "scratch");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("minioadmin"));
        assert!(printed.contains("scratch"));
    }
}
