use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcomeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainMetricsSnapshot {
    pub total_success: u64,
    pub total_failure: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<DrainOutcomeStatus>,
    pub last_entity: Option<String>,
    pub last_trigger: Option<String>,
    pub last_applied_count: Option<u32>,
    pub last_remaining_count: Option<u32>,
    pub last_backoff_ms: Option<u64>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// UI 表示用の接続状態と未送信件数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub online: bool,
    pub is_syncing: bool,
    pub pending_count: u64,
    pub dead_letter_count: u64,
    pub pending_by_entity: BTreeMap<String, u64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub metrics: DrainMetricsSnapshot,
}
