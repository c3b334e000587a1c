//! # Automation Coordinators
//!
//! Throttled, retrying background actions driven by host events.
//!
//! ## Overview
//!
//! Saves and status changes arrive far more often than a cloud service should
//! be hit. This crate turns that stream into a small number of serialized
//! provider calls:
//! - Events are throttled per key and coalesced (last write wins)
//! - A single drain processes the queue one action at a time
//! - Failures are retried with linear backoff, then logged
//! - Outcomes are kept in a bounded result log for display
//!
//! ## Components
//!
//! - **Coordinator** (`coordinator`): The generic throttle/queue/retry engine
//! - **Action model** (`action`): Keys, dispositions and the `ActionHandler` trait
//! - **Retry bookkeeping** (`retry`): Attempt counters and the backoff schedule
//! - **Result log** (`results`): Newest-first ring of outcomes
//! - **Provider registry** (`providers`): `CloudProvider`s keyed by service
//! - **Auto sync** (`auto_sync`): Uploads entity snapshots after saves

pub mod action;
pub mod auto_sync;
pub mod coordinator;
pub mod error;
pub mod providers;
pub mod results;
pub mod retry;
pub mod status;

pub use action::{ActionHandler, ActionKey, ActionOutcome, Disposition, QueuedEvent, SkipReason};
pub use auto_sync::{AutoSync, SyncHandler, AUTO_SYNC, DEFAULT_REMOTE_ROOT};
pub use coordinator::Coordinator;
pub use error::{ActionError, Result, SyncError};
pub use providers::ProviderRegistry;
pub use results::{ActionResult, ResultLog};
pub use retry::{RetryDecision, RetryPolicy, RetryTracker};
pub use status::CoordinatorStatus;
