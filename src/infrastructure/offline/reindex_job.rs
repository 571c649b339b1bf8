use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::record_store::RecordStore;
use crate::domain::entities::offline::{QueueEntryDraft, Record};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsyncedRecordDigest {
    pub entity: String,
    pub record_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineReindexReport {
    pub unsynced_record_count: usize,
    pub requeued_count: usize,
    pub pending_queue_count: u64,
    pub dead_letter_count: u64,
    pub requeued_records: Vec<UnsyncedRecordDigest>,
    pub emitted_at: i64,
}

/// 未同期のままキューに対応するエントリがないレコードを拾い直す。
///
/// キュー削除後にローカル書き込みだけが残った場合などの取りこぼし対策。
pub struct OfflineReindexJob {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn MutationQueue>,
    gate: Mutex<()>,
}

impl OfflineReindexJob {
    pub fn create(store: Arc<dyn RecordStore>, queue: Arc<dyn MutationQueue>) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            gate: Mutex::new(()),
        })
    }

    pub fn trigger(self: &Arc<Self>) {
        let job = Arc::clone(self);
        tokio::spawn(async move {
            job.run_guarded().await;
        });
    }

    pub async fn reindex_once(&self) -> Result<OfflineReindexReport, AppError> {
        let unsynced = self.store.list_unsynced(None).await?;

        let mut requeued = Vec::new();
        for record in &unsynced {
            if self.ensure_record_in_queue(record).await? {
                requeued.push(UnsyncedRecordDigest {
                    entity: record.entity.to_string(),
                    record_id: record.id.to_string(),
                });
            }
        }

        let counts = self.queue.counts().await?;

        Ok(OfflineReindexReport {
            unsynced_record_count: unsynced.len(),
            requeued_count: requeued.len(),
            pending_queue_count: counts.pending,
            dead_letter_count: counts.dead_letter,
            requeued_records: requeued,
            emitted_at: Utc::now().timestamp_millis(),
        })
    }

    async fn ensure_record_in_queue(&self, record: &Record) -> Result<bool, AppError> {
        if self
            .queue
            .has_entries_for(&record.entity, &record.id)
            .await?
        {
            return Ok(false);
        }

        // update は NotFound の場合 insert にフォールバックするので作成済みかどうかを問わない
        self.queue
            .enqueue(QueueEntryDraft::update(
                record.entity.clone(),
                record.id.clone(),
                record.payload.clone(),
            ))
            .await?;
        Ok(true)
    }

    async fn run_guarded(self: Arc<Self>) {
        let _guard = self.gate.lock().await;
        match self.reindex_once().await {
            Ok(report) => {
                tracing::info!(
                    target: "offline::reindex",
                    requeued = report.requeued_count,
                    pending = report.pending_queue_count,
                    dead_letters = report.dead_letter_count,
                    "offline reindex completed"
                );
            }
            Err(err) => {
                tracing::error!(
                    target: "offline::reindex",
                    error = %err,
                    "offline reindex job failed"
                );
            }
        }
    }
}
