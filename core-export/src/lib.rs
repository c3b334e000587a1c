//! # Project Export
//!
//! Renders completed research projects to files and optionally uploads them.
//!
//! ## Components
//!
//! - **Formats** (`format`): `ExportFormat`, the `DocumentGenerator` trait and
//!   the built-in JSON/Markdown/plain text generator
//! - **Auto export** (`auto_export`): `ExportSettings`, the export action
//!   handler and the `AutoExport` coordinator
//!
//! Throttling, retries and the result log come from `core-sync`.

pub mod auto_export;
pub mod error;
pub mod format;

pub use auto_export::{AutoExport, ExportHandler, ExportSettings, AUTO_EXPORT};
pub use error::{ExportError, Result};
pub use format::{file_name, DocumentGenerator, ExportFormat, StandardDocumentGenerator};
