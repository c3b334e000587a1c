//! Bounded, newest-first history of action outcomes.

use chrono::{DateTime, Utc};
use core_runtime::events::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::action::ActionKey;

/// One logged outcome. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: Uuid,
    pub success: bool,
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// Provider (sync) or format list (export)
    pub target: String,
    /// Remote path or file written on success
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    /// Retries taken before this outcome
    pub retry_count: u32,
}

impl ActionResult {
    pub fn success(
        key: &ActionKey,
        target: impl Into<String>,
        location: Option<String>,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: true,
            entity_type: key.entity_type,
            entity_id: key.entity_id.clone(),
            target: target.into(),
            location,
            timestamp,
            error: None,
            retry_count,
        }
    }

    pub fn failure(
        key: &ActionKey,
        target: impl Into<String>,
        error: impl Into<String>,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: false,
            entity_type: key.entity_type,
            entity_id: key.entity_id.clone(),
            target: target.into(),
            location: None,
            timestamp,
            error: Some(error.into()),
            retry_count,
        }
    }

    pub fn key(&self) -> ActionKey {
        ActionKey::new(self.entity_type, self.entity_id.clone())
    }
}

/// Ring of results, newest first. Entries past `capacity` are dropped.
#[derive(Debug, Clone)]
pub struct ResultLog {
    entries: VecDeque<ActionResult>,
    capacity: usize,
}

impl ResultLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, result: ActionResult) {
        self.entries.push_front(result);
        self.entries.truncate(self.capacity);
    }

    /// Newest `limit` entries.
    pub fn recent(&self, limit: usize) -> Vec<ActionResult> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn all(&self) -> Vec<ActionResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn failed(&self) -> Vec<ActionResult> {
        self.entries.iter().filter(|r| !r.success).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
