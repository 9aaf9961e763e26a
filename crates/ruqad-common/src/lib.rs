//! RuQaD Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging setup and archive helpers for the RuQaD
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`RuqadError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by `LOG_*` variables
//! - **Archives**: reading `.eln` / `.zip` containers
//! - **Timestamps**: parsing repository creation times
//!
//! # Example
//!
//! ```no_run
//! use ruqad_common::archive::ArchiveReader;
//! use std::path::Path;
//!
//! fn list(path: &Path) -> ruqad_common::Result<()> {
//!     let reader = ArchiveReader::open(path)?;
//!     for name in reader.names() {
//!         tracing::info!(entry = %name, "archive entry");
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod error;
pub mod logging;
pub mod timestamp;

// Re-export commonly used types
pub use error::{Result, RuqadError};
