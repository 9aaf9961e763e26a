//! Error type at the monitor boundary

use thiserror::Error;

use crate::crawler::CrawlError;
use crate::kadi::{CollectError, ExportError};
use crate::quality::QualityCheckError;

/// Anything that can end a cycle or the processing of one record
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Record collection failed")]
    Collect(#[from] CollectError),

    #[error("Record export failed")]
    Export(#[from] ExportError),

    #[error("Quality check failed")]
    QualityCheck(#[from] QualityCheckError),

    #[error("Validate-and-publish failed")]
    Crawl(#[from] CrawlError),

    #[error("HTTP client setup failed")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] ruqad_common::RuqadError),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// The error followed by its sources, joined with `: `
    ///
    /// Sources whose text already appears in the message are skipped.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kadi::ExportError;

    #[test]
    fn test_chain_includes_sources() {
        let error = MonitorError::from(ExportError::RecordNotFound(1222));
        assert_eq!(error.chain(), "Record export failed: Record 1222 does not exist");
    }

    #[test]
    fn test_transparent_common_error() {
        let error = MonitorError::from(ruqad_common::RuqadError::config("bad"));
        assert_eq!(error.chain(), "Configuration error: bad");
    }
}
