//! # Event Bus System
//!
//! Typed events and the broadcaster that carries them between the host
//! application and the automation coordinators.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: entity saves, project status changes and coordinator outcomes
//! - **EventBus**: an injected broadcaster with two delivery paths
//! - **EventStream**: filtered consumption of the async delivery path
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  emit_save_event   ┌───────────┐  on(EntitySaved)   ┌──────────┐
//! │ Host editor  ├───────────────────>│           ├───────────────────>│ AutoSync │
//! └──────────────┘                    │           │                    └──────────┘
//!                                     │ EventBus  │
//! ┌──────────────┐  status change     │           │  on(ProjectStatus) ┌────────────┐
//! │ Project view ├───────────────────>│           ├───────────────────>│ AutoExport │
//! └──────────────┘                    │           │                    └────────────┘
//!                                     │           │  subscribe()       ┌────────────┐
//!                                     │           ├───────────────────>│ UI / logs  │
//!                                     └───────────┘                    └────────────┘
//! ```
//!
//! ## Delivery
//!
//! Listeners registered with [`EventBus::on`] are called synchronously, in
//! registration order, on the emitting thread. Each call runs under
//! `catch_unwind`, so a panicking listener is logged and skipped without
//! affecting the listeners after it. An event emitted while no listener is
//! registered for its name is dropped.
//!
//! Every emitted event is also pushed into a `tokio::sync::broadcast` channel.
//! Async consumers call [`EventBus::subscribe`] and handle
//! `RecvError::Lagged(n)` if they fall behind.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventName, Listener};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new(16);
//! let listener: Listener = Arc::new(|event: &CoreEvent| {
//!     println!("saw {}", event.description());
//! });
//!
//! bus.on(EventName::EntitySaved, listener.clone());
//! assert_eq!(bus.listener_count(EventName::EntitySaved), 1);
//! assert!(bus.off(EventName::EntitySaved, &listener));
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, trace};

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the async delivery channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Payload Snapshots
// ============================================================================

/// Logical kind of a syncable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Note,
    Project,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Note => "note",
            EntityKind::Project => "project",
            EntityKind::Task => "task",
        }
    }

    /// Plural folder name used when laying out remote paths.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Note => "notes",
            EntityKind::Project => "projects",
            EntityKind::Task => "tasks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "note" => Some(EntityKind::Note),
            "project" => Some(EntityKind::Project),
            "task" => Some(EntityKind::Task),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a note, project or task taken when it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub title: String,
    /// Whether the user opted this record into cloud sync
    #[serde(default)]
    pub cloud_synced: bool,
    /// Service name the record syncs to (e.g. "dropbox")
    #[serde(default)]
    pub cloud_service: Option<String>,
    /// Opaque record body
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            cloud_synced: false,
            cloud_service: None,
            content: serde_json::Value::Null,
            updated_at: None,
        }
    }

    /// Opt the record into sync with the given service.
    pub fn synced_to(mut self, service: impl Into<String>) -> Self {
        self.cloud_synced = true;
        self.cloud_service = Some(service.into());
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }
}

/// Snapshot of a research project taken when its status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectSnapshot {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: status.into(),
            content: serde_json::Value::Null,
            updated_at: None,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    /// `true` when the status is "completed", ignoring ASCII case.
    pub fn is_completed(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("completed")
    }
}

// ============================================================================
// Core Event Types
// ============================================================================

/// An entity was saved by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEvent {
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub entity: EntitySnapshot,
    pub timestamp: DateTime<Utc>,
}

impl SaveEvent {
    pub fn new(
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        entity: EntitySnapshot,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            entity,
            timestamp,
        }
    }
}

/// A project's status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub project: ProjectSnapshot,
    #[serde(default)]
    pub previous_status: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Outcomes reported by the sync and export coordinators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CoordinatorEvent {
    /// An action completed.
    ActionSucceeded {
        /// Coordinator name ("auto-sync" or "auto-export").
        coordinator: String,
        /// Rendered key, `type:id`.
        key: String,
        /// Provider or formats the action targeted.
        target: String,
        /// Retries it took.
        retry_count: u32,
    },
    /// An action failed and will be retried.
    RetryScheduled {
        coordinator: String,
        key: String,
        /// Retry number, starting at 1.
        attempt: u32,
        delay_ms: u64,
        message: String,
    },
    /// An action failed permanently.
    ActionFailed {
        coordinator: String,
        key: String,
        message: String,
        retry_count: u32,
    },
    /// The coordinator was disabled and dropped its in-flight work.
    Reset {
        coordinator: String,
        /// Queue entries discarded.
        dropped: usize,
    },
}

impl CoordinatorEvent {
    fn description(&self) -> &str {
        match self {
            CoordinatorEvent::ActionSucceeded { .. } => "Action succeeded",
            CoordinatorEvent::RetryScheduled { .. } => "Action retry scheduled",
            CoordinatorEvent::ActionFailed { .. } => "Action failed permanently",
            CoordinatorEvent::Reset { .. } => "Coordinator reset",
        }
    }
}

/// Top-level event enum carried by the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    EntitySaved(SaveEvent),
    ProjectStatusChanged(StatusChangeEvent),
    Coordinator(CoordinatorEvent),
}

impl CoreEvent {
    /// Name used for listener registration.
    pub fn name(&self) -> EventName {
        match self {
            CoreEvent::EntitySaved(_) => EventName::EntitySaved,
            CoreEvent::ProjectStatusChanged(_) => EventName::ProjectStatusChanged,
            CoreEvent::Coordinator(_) => EventName::Coordinator,
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::EntitySaved(_) => "Entity saved",
            CoreEvent::ProjectStatusChanged(_) => "Project status changed",
            CoreEvent::Coordinator(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Coordinator(CoordinatorEvent::ActionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Coordinator(CoordinatorEvent::RetryScheduled { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Coordinator(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Registration names for [`EventBus::on`] / [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    EntitySaved,
    ProjectStatusChanged,
    Coordinator,
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Synchronous listener callback.
///
/// Listeners are compared by `Arc` identity, so keep the `Arc` you registered
/// if you intend to call [`EventBus::off`] later.
pub type Listener = Arc<dyn Fn(&CoreEvent) + Send + Sync>;

/// Injected broadcaster shared by the host and the coordinators.
///
/// Cloning is cheap and every clone refers to the same listener table and
/// broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<EventName, Vec<Listener>>>>,
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus whose async channel buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            sender,
        }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Registers a listener for `name`.
    ///
    /// Registering the same `Arc` twice makes it fire twice per event.
    pub fn on(&self, name: EventName, listener: Listener) {
        self.listeners.write().entry(name).or_default().push(listener);
        trace!(event = ?name, "Listener registered");
    }

    /// Removes the first registration of `listener` under `name`.
    ///
    /// Returns `false` if the listener was not registered.
    pub fn off(&self, name: EventName, listener: &Listener) -> bool {
        let mut listeners = self.listeners.write();
        let Some(registered) = listeners.get_mut(&name) else {
            return false;
        };

        match registered.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                registered.remove(index);
                if registered.is_empty() {
                    listeners.remove(&name);
                }
                true
            }
            None => false,
        }
    }

    /// Delivers `event` to every listener registered for its name, then to
    /// async subscribers.
    ///
    /// Returns the number of listeners that returned without panicking.
    pub fn emit(&self, event: CoreEvent) -> usize {
        let name = event.name();

        // Snapshot so listeners may call on/off while being invoked.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(&name)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        event = ?name,
                        listener_index = index,
                        panic = %panic_message(payload.as_ref()),
                        "Event listener panicked"
                    );
                }
            }
        }

        // No subscribers is not an error for a fire-and-forget bus.
        self.sender.send(event).ok();

        delivered
    }

    /// Creates a receiver for the async delivery path.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of synchronous listeners registered under `name`.
    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners.read().get(&name).map_or(0, Vec::len)
    }

    /// Returns the number of active async subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let listener_total: usize = listeners.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("listener_count", &listener_total)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let failures = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Coordinator(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
