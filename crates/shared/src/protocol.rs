use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ItemId;

/// Body delivered to the trigger gateway when an operator asks for a
/// publish. Carries the item's opaque payload so the triggered job can run
/// without credentials for the upstream prediction store; the shared catalog
/// document stays authoritative for state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub item_id: ItemId,
    /// True when the operator explicitly retried a `failed` item. A worker
    /// that finds the item `failed` without this flag treats the trigger as
    /// a stale redelivery and does nothing.
    #[serde(default)]
    pub retry: bool,
    /// Correlates redeliveries of one operator action across logs.
    pub delivery_id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl TriggerRequest {
    pub fn new(item_id: ItemId, retry: bool, payload: serde_json::Value) -> Self {
        Self {
            item_id,
            retry,
            delivery_id: Uuid::new_v4(),
            requested_at: Utc::now(),
            payload,
        }
    }
}

/// Why the gateway refused a dispatch outright. These surface to the
/// operator immediately; nothing is polled afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BadCredential,
    UnknownTarget,
    RateLimited,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::BadCredential => "credential was rejected",
            RejectReason::UnknownTarget => "dispatch target does not exist",
            RejectReason::RateLimited => "dispatch rate limit reached",
        };
        f.write_str(text)
    }
}
