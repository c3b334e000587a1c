use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a coordinator, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub is_enabled: bool,
    /// When the last queue drain finished
    pub last_action_time: Option<DateTime<Utc>>,
    /// Events waiting in the queue
    pub pending_count: usize,
    /// Permanent failures since start or the last `clear_results`
    pub failed_count: u64,
    pub is_processing: bool,
    pub last_error: Option<String>,
}
