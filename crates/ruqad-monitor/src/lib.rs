//! RuQaD Monitor Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests new records from a Kadi4Mat instance, runs each exported archive
//! through the external data-quality pipeline and publishes the resulting
//! metadata to the catalog when it passes schema validation.
//!
//! # Overview
//!
//! - **kadi**: cursor-driven record discovery and `.eln` export
//! - **storage**: S3 scratch bucket for pipeline input
//! - **quality**: pipeline state machine and polling primitive
//! - **crawler**: scanning, validation and the publish gate
//! - **monitor**: the polling loop and cursor handling
//! - **config**: environment-driven configuration

pub mod config;
pub mod crawler;
pub mod error;
pub mod kadi;
pub mod monitor;
pub mod quality;
pub mod storage;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::{FailurePolicy, IngestionCursor, Monitor};
