use super::entity_locks::EntityLocks;
use super::remote_replay::replay_entry;
use crate::application::ports::mutation_queue::{AttemptFailure, MutationQueue};
use crate::application::ports::record_store::RecordStore;
use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::entities::offline::{
    DrainHalt, DrainOutcomeStatus, DrainReport, QueueEntry,
};
use crate::domain::value_objects::{EntityType, QueueEntryId, RecordPayload};
use crate::infrastructure::offline::{DrainMetrics, DrainOutcomeMetadata};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 送信を開始したきっかけ。接続回復と手動同期はバックオフを無視する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    Mutation,
    Reconnect,
    Manual,
}

impl DrainTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainTrigger::Mutation => "mutation",
            DrainTrigger::Reconnect => "reconnect",
            DrainTrigger::Manual => "manual",
        }
    }

    pub fn forces(&self) -> bool {
        matches!(self, DrainTrigger::Manual | DrainTrigger::Reconnect)
    }
}

/// 送信キューを追加順にリモートへ再送する（push 側）。
pub struct Drainer {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn MutationQueue>,
    gateway: Arc<dyn RemoteGateway>,
    locks: Arc<EntityLocks>,
    metrics: Arc<DrainMetrics>,
    config: SyncConfig,
    request_timeout: Duration,
}

impl Drainer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn MutationQueue>,
        gateway: Arc<dyn RemoteGateway>,
        locks: Arc<EntityLocks>,
        metrics: Arc<DrainMetrics>,
        config: SyncConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            gateway,
            locks,
            metrics,
            config,
            request_timeout,
        }
    }

    /// `entity` 未指定の場合は未送信エントリを持つ全レーンを並行して処理する
    pub async fn drain(
        &self,
        entity: Option<&EntityType>,
        trigger: DrainTrigger,
    ) -> Result<Vec<DrainReport>, AppError> {
        let entities = match entity {
            Some(entity) => vec![entity.clone()],
            None => self.queue.pending_entities().await?,
        };
        self.drain_entities(&entities, trigger).await
    }

    pub async fn drain_entities(
        &self,
        entities: &[EntityType],
        trigger: DrainTrigger,
    ) -> Result<Vec<DrainReport>, AppError> {
        let results = join_all(
            entities
                .iter()
                .map(|entity| self.drain_entity(entity, trigger)),
        )
        .await;
        results.into_iter().collect()
    }

    /// 1 レーンを先頭から処理する。失敗したらそのレーンはそこで止める。
    pub async fn drain_entity(
        &self,
        entity: &EntityType,
        trigger: DrainTrigger,
    ) -> Result<DrainReport, AppError> {
        let _guard = self.locks.acquire(entity).await;
        let started = Instant::now();

        let entries = self.queue.drain_in_order(Some(entity)).await?;
        let mut report = DrainReport::new(entity.clone());
        if entries.is_empty() {
            return Ok(report);
        }

        let now = Utc::now();
        let mut backoff: Option<Duration> = None;

        for (index, entry) in entries.iter().enumerate() {
            if entry.is_dead_letter() {
                report.halted = Some(DrainHalt::DeadLetter { entry_id: entry.id });
                report.failed = remaining_ids(&entries[index..]);
                break;
            }

            if !trigger.forces() && entry.is_backing_off(now) {
                if let Some(until) = entry.next_attempt_at {
                    report.halted = Some(DrainHalt::BackingOff {
                        entry_id: entry.id,
                        until,
                    });
                }
                report.failed = remaining_ids(&entries[index..]);
                break;
            }

            if self.config.coalesce_updates {
                if let Some(next) = entries.get(index + 1) {
                    if entry.is_superseded_by(next) && !next.is_dead_letter() {
                        self.queue.remove(entry.id).await?;
                        report.coalesced.push(entry.id);
                        tracing::trace!(
                            target: "offline::drain",
                            entry_id = %entry.id,
                            superseded_by = %next.id,
                            "update coalesced"
                        );
                        continue;
                    }
                }
            }

            match replay_entry(self.gateway.as_ref(), entry, self.request_timeout).await {
                Ok(canonical) => {
                    self.queue.remove(entry.id).await?;
                    report.succeeded.push(entry.id);
                    if let Some(canonical) = canonical {
                        self.mark_synced(entry, canonical).await?;
                    }
                }
                Err(err) => {
                    let attempts = entry.attempt_count.saturating_add(1);
                    let dead_letter =
                        err.is_rejection() && attempts >= self.config.max_rejections;
                    let delay = self.config.backoff_for(attempts);
                    let next_attempt_at = if dead_letter {
                        None
                    } else {
                        chrono::Duration::from_std(delay)
                            .ok()
                            .map(|delay| Utc::now() + delay)
                    };

                    self.queue
                        .record_failure(
                            entry.id,
                            &AttemptFailure {
                                attempted_at: Utc::now(),
                                next_attempt_at,
                                error: err.to_string(),
                                dead_letter,
                            },
                        )
                        .await?;

                    if dead_letter {
                        tracing::error!(
                            target: "offline::drain",
                            entity = %entity,
                            entry_id = %entry.id,
                            record_id = %entry.record_id,
                            attempts,
                            error = %err,
                            "entry moved to dead letter; lane blocked until operator review"
                        );
                        report.halted = Some(DrainHalt::DeadLetter { entry_id: entry.id });
                    } else {
                        tracing::warn!(
                            target: "offline::drain",
                            entity = %entity,
                            entry_id = %entry.id,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %err,
                            "remote replay failed; lane halted"
                        );
                        backoff = Some(delay);
                        report.halted = Some(DrainHalt::Failed {
                            entry_id: entry.id,
                            error: err.to_string(),
                            retryable: err.is_retryable(),
                        });
                    }
                    report.failed = remaining_ids(&entries[index..]);
                    break;
                }
            }
        }

        self.record_metrics(&report, trigger, started, backoff);
        Ok(report)
    }

    pub async fn dead_letters(&self) -> Result<Vec<QueueEntry>, AppError> {
        self.queue.dead_letters().await
    }

    /// デッドレターを保留に戻す。次の送信で再試行される。
    pub async fn retry_dead_letter(&self, id: QueueEntryId) -> Result<bool, AppError> {
        let Some(entry) = self.queue.get(id).await? else {
            return Ok(false);
        };
        let _guard = self.locks.acquire(&entry.entity).await;
        let requeued = self.queue.requeue(id).await?;
        if requeued {
            tracing::info!(
                target: "offline::drain",
                entry_id = %id,
                entity = %entry.entity,
                "dead letter requeued"
            );
        }
        Ok(requeued)
    }

    /// デッドレターを明示的に破棄する。
    ///
    /// 同じレコードに後続エントリが無ければ未送信のローカル行も取り除く。
    /// 残しておくと起動時の再インデックスが同じ変更を積み直すため。
    /// 取り除いた行は次回の pull でリモートの内容に戻る。
    pub async fn discard_dead_letter(&self, id: QueueEntryId) -> Result<bool, AppError> {
        let Some(entry) = self.queue.get(id).await? else {
            return Ok(false);
        };
        if !entry.is_dead_letter() {
            return Ok(false);
        }

        let _guard = self.locks.acquire(&entry.entity).await;
        self.queue.remove(id).await?;
        let dropped_local = self.drop_orphaned_local(&entry).await?;
        tracing::warn!(
            target: "offline::drain",
            entry_id = %id,
            entity = %entry.entity,
            record_id = %entry.record_id,
            operation = entry.operation.as_str(),
            last_error = entry.last_error.as_deref().unwrap_or(""),
            dropped_local,
            "dead letter discarded by operator"
        );
        Ok(true)
    }

    async fn drop_orphaned_local(&self, entry: &QueueEntry) -> Result<bool, AppError> {
        if self
            .queue
            .has_entries_for(&entry.entity, &entry.record_id)
            .await?
        {
            return Ok(false);
        }
        match self.store.get(&entry.entity, &entry.record_id).await? {
            Some(record) if !record.synced => {
                self.store.delete(&entry.entity, &entry.record_id).await
            }
            _ => Ok(false),
        }
    }

    // 後続エントリが残っている間は synced にしない
    async fn mark_synced(
        &self,
        entry: &QueueEntry,
        canonical: RecordPayload,
    ) -> Result<(), AppError> {
        if self
            .queue
            .has_entries_for(&entry.entity, &entry.record_id)
            .await?
        {
            return Ok(());
        }
        let Some(mut record) = self.store.get(&entry.entity, &entry.record_id).await? else {
            return Ok(());
        };
        record.mark_synced(Some(canonical));
        self.store.put(&record, true).await
    }

    fn record_metrics(
        &self,
        report: &DrainReport,
        trigger: DrainTrigger,
        started: Instant,
        backoff: Option<Duration>,
    ) {
        let (status, error) = match &report.halted {
            Some(DrainHalt::Failed { error, .. }) => {
                (DrainOutcomeStatus::Failure, Some(error.clone()))
            }
            Some(DrainHalt::DeadLetter { entry_id }) => (
                DrainOutcomeStatus::Failure,
                Some(format!("lane blocked by dead letter {entry_id}")),
            ),
            Some(DrainHalt::BackingOff { .. }) if report.applied_count() == 0 => return,
            _ => (DrainOutcomeStatus::Success, None),
        };

        let snapshot = self.metrics.record(
            status,
            &DrainOutcomeMetadata {
                entity: Some(report.entity.to_string()),
                trigger: Some(trigger.as_str().to_string()),
                applied_count: Some(report.applied_count() as u32),
                remaining_count: Some(report.failed.len() as u32),
                backoff_ms: backoff.map(|d| d.as_millis() as u64),
                duration_ms: Some(started.elapsed().as_millis() as u64),
                error,
            },
        );

        tracing::debug!(
            target: "offline::drain",
            entity = %report.entity,
            trigger = trigger.as_str(),
            succeeded = report.succeeded.len(),
            coalesced = report.coalesced.len(),
            remaining = report.failed.len(),
            consecutive_failure = snapshot.consecutive_failure,
            "drain pass finished"
        );
    }
}

fn remaining_ids(entries: &[QueueEntry]) -> Vec<QueueEntryId> {
    entries.iter().map(|entry| entry.id).collect()
}
