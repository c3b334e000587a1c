//! # Host Bridge Traits
//!
//! Capability traits the automation core consumes from its host.
//!
//! ## Overview
//!
//! The core never talks to a vendor SDK, a preferences database or the host
//! logger directly. Each of those is reached through one of the traits below,
//! which the host application (or a bundled adapter crate such as
//! `provider-local-folder`) implements.
//!
//! ## Traits
//!
//! ### Storage
//! - [`CloudProvider`](storage::CloudProvider) - Upload/list/download against a cloud service
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their own failures into it with enough context (paths, service
//! names) to be actionable in a log line.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; coordinators hold implementations in
//! `Arc` and call them from spawned tasks.

pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use storage::{CloudProvider, ProviderKind, RemoteFile, SettingsStore};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
