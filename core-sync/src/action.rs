//! Action model shared by the sync and export coordinators.
//!
//! A coordinator is generic over an [`ActionHandler`]: the handler decides
//! whether a payload is eligible, whether its provider is ready, and performs
//! the actual work. Everything else (throttling, queueing, retries, the
//! result log) lives in [`Coordinator`](crate::coordinator::Coordinator).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_runtime::events::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::ActionError;

/// Coalescing unit: `(entity_type, entity_id)`.
///
/// Rendered as `type:id` for map lookups and log fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub entity_type: EntityKind,
    pub entity_id: String,
}

impl ActionKey {
    pub fn new(entity_type: EntityKind, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// An event waiting in a coordinator queue.
///
/// `epoch` is the coordinator generation at enqueue time. Outcomes are only
/// committed while the coordinator is still in that generation.
#[derive(Debug, Clone)]
pub struct QueuedEvent<P> {
    pub key: ActionKey,
    pub payload: P,
    pub timestamp: DateTime<Utc>,
    pub(crate) epoch: u64,
}

impl<P> QueuedEvent<P> {
    pub(crate) fn new(key: ActionKey, payload: P, timestamp: DateTime<Utc>, epoch: u64) -> Self {
        Self {
            key,
            payload,
            timestamp,
            epoch,
        }
    }
}

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Provider or format(s) the action wrote to
    pub target: String,
    /// Remote path or local file written, if any
    pub location: Option<String>,
}

impl ActionOutcome {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Why an action was skipped without being attempted.
///
/// Skips are not failures: no result is recorded and nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("coordinator is disabled")]
    Disabled,

    #[error("not eligible: {0}")]
    NotEligible(String),

    #[error("no provider registered for {0}")]
    ProviderUnavailable(String),

    #[error("{0} is not connected")]
    NotConnected(String),

    #[error("no async runtime available to schedule the action")]
    RuntimeUnavailable,
}

/// Result of handing one event to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A precondition was not met
    Skipped(SkipReason),
    /// The action succeeded after `retry_count` retries
    Succeeded { retry_count: u32 },
    /// The action failed; retry number `attempt` runs after `delay`
    RetryScheduled { attempt: u32, delay: Duration },
    /// The action failed and retries are exhausted
    Failed { retry_count: u32 },
    /// The coordinator was reset while the action ran; nothing was recorded
    Discarded,
}

/// Per-variant behaviour plugged into a [`Coordinator`](crate::coordinator::Coordinator).
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Snapshot carried through the queue
    type Payload: Clone + Send + Sync + 'static;

    /// Short name used in logs and outcome events
    fn name(&self) -> &'static str;

    /// Provider or format description recorded on results
    fn target(&self, payload: &Self::Payload) -> String;

    /// Cheap, synchronous eligibility check on the snapshot.
    ///
    /// Evaluated when an event is scheduled and again before it runs.
    fn check_eligible(&self, key: &ActionKey, payload: &Self::Payload) -> Result<(), SkipReason>;

    /// Whether the downstream provider can take the action right now.
    async fn check_ready(&self, payload: &Self::Payload) -> Result<(), SkipReason>;

    /// Do the work. Errors feed the retry policy.
    async fn perform(
        &self,
        key: &ActionKey,
        payload: &Self::Payload,
    ) -> Result<ActionOutcome, ActionError>;
}
