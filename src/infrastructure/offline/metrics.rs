use crate::domain::entities::offline::{DrainMetricsSnapshot, DrainOutcomeStatus};
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainOutcomeMetadata {
    pub entity: Option<String>,
    pub trigger: Option<String>,
    pub applied_count: Option<u32>,
    pub remaining_count: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Default, Clone)]
struct LastDrainMetadata {
    last_outcome: Option<DrainOutcomeStatus>,
    entity: Option<String>,
    trigger: Option<String>,
    applied_count: Option<u32>,
    remaining_count: Option<u32>,
    backoff_ms: Option<u64>,
    duration_ms: Option<u64>,
    error: Option<String>,
}

/// レーン単位の送信結果を集計する。
pub struct DrainMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    metadata: Mutex<LastDrainMetadata>,
}

impl DrainMetrics {
    pub fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            metadata: Mutex::new(LastDrainMetadata::default()),
        }
    }

    pub fn record(
        &self,
        status: DrainOutcomeStatus,
        meta: &DrainOutcomeMetadata,
    ) -> DrainMetricsSnapshot {
        match status {
            DrainOutcomeStatus::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
                self.last_success_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            DrainOutcomeStatus::Failure => {
                self.failure.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.metadata.lock() {
            guard.last_outcome = Some(status);
            guard.entity = meta.entity.clone();
            guard.trigger = meta.trigger.clone();
            guard.applied_count = meta.applied_count;
            guard.remaining_count = meta.remaining_count;
            guard.backoff_ms = meta.backoff_ms;
            guard.duration_ms = meta.duration_ms;
            guard.error = meta.error.clone();
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> DrainMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| LastDrainMetadata::default());

        DrainMetricsSnapshot {
            total_success: self.success.load(Ordering::Relaxed),
            total_failure: self.failure.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: metadata.last_outcome,
            last_entity: metadata.entity,
            last_trigger: metadata.trigger,
            last_applied_count: metadata.applied_count,
            last_remaining_count: metadata.remaining_count,
            last_backoff_ms: metadata.backoff_ms,
            last_duration_ms: metadata.duration_ms,
            last_error: metadata.error,
        }
    }
}

impl Default for DrainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
