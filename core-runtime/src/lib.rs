//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the automation crates:
//! - Logging and tracing infrastructure
//! - Coordinator configuration
//! - Event bus carrying save, status-change and outcome events
//!
//! ## Overview
//!
//! Coordinators, the service facade and provider adapters all depend on this
//! crate for the logging conventions, configuration validation and event
//! plumbing they share.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
