use crate::domain::entities::offline::{QueueEntry, QueueEntryDraft};
use crate::domain::value_objects::{EntityType, QueueEntryId, RecordId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// 失敗した再送試行の記録内容
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub attempted_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error: String,
    pub dead_letter: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub dead_letter: u64,
    pub by_entity: BTreeMap<String, u64>,
}

/// 永続化された追記専用の送信キュー。
#[async_trait]
pub trait MutationQueue: Send + Sync {
    async fn enqueue(&self, draft: QueueEntryDraft) -> Result<QueueEntry, AppError>;
    /// 追加順（通し番号順）のスナップショット。`entity` 指定時はそのレーンのみ。
    async fn drain_in_order(&self, entity: Option<&EntityType>)
        -> Result<Vec<QueueEntry>, AppError>;
    async fn remove(&self, id: QueueEntryId) -> Result<(), AppError>;
    async fn get(&self, id: QueueEntryId) -> Result<Option<QueueEntry>, AppError>;
    async fn record_failure(
        &self,
        id: QueueEntryId,
        failure: &AttemptFailure,
    ) -> Result<(), AppError>;
    /// デッドレターを保留状態に戻し、バックオフをリセットする
    async fn requeue(&self, id: QueueEntryId) -> Result<bool, AppError>;
    async fn has_entries_for(&self, entity: &EntityType, id: &RecordId) -> Result<bool, AppError>;
    async fn pending_entities(&self) -> Result<Vec<EntityType>, AppError>;
    async fn dead_letters(&self) -> Result<Vec<QueueEntry>, AppError>;
    async fn counts(&self) -> Result<QueueCounts, AppError>;
}
