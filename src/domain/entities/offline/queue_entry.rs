use crate::domain::value_objects::{
    EntityType, MutationOperation, QueueEntryId, QueueEntryStatus, RecordId, RecordPayload,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// キューに追加する際のドラフト。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntryDraft {
    pub entity: EntityType,
    pub record_id: RecordId,
    pub operation: MutationOperation,
    pub data: Option<RecordPayload>,
}

impl QueueEntryDraft {
    pub fn create(entity: EntityType, record_id: RecordId, data: RecordPayload) -> Self {
        Self {
            entity,
            record_id,
            operation: MutationOperation::Create,
            data: Some(data),
        }
    }

    pub fn update(entity: EntityType, record_id: RecordId, data: RecordPayload) -> Self {
        Self {
            entity,
            record_id,
            operation: MutationOperation::Update,
            data: Some(data),
        }
    }

    pub fn delete(entity: EntityType, record_id: RecordId) -> Self {
        Self {
            entity,
            record_id,
            operation: MutationOperation::Delete,
            data: None,
        }
    }
}

/// 未送信のミューテーション 1 件。`operation` と `data` は追加後に変わらない。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub entity: EntityType,
    pub record_id: RecordId,
    pub operation: MutationOperation,
    pub data: Option<RecordPayload>,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status: QueueEntryStatus,
}

impl QueueEntry {
    pub fn is_dead_letter(&self) -> bool {
        self.status == QueueEntryStatus::DeadLetter
    }

    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map(|at| at > now).unwrap_or(false)
    }

    /// 同じレコードに対する後続の update で置き換え可能か
    pub fn is_superseded_by(&self, next: &QueueEntry) -> bool {
        self.operation == MutationOperation::Update
            && next.operation == MutationOperation::Update
            && self.entity == next.entity
            && self.record_id == next.record_id
    }
}
