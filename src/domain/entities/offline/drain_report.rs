use crate::domain::value_objects::{EntityType, QueueEntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// レーンの処理が途中で止まった理由
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrainHalt {
    /// リモート呼び出しが失敗した（エントリは残る）
    Failed {
        entry_id: QueueEntryId,
        error: String,
        retryable: bool,
    },
    /// 先頭エントリがバックオフ中
    BackingOff {
        entry_id: QueueEntryId,
        until: DateTime<Utc>,
    },
    /// 先頭エントリがデッドレターでレーンが塞がっている
    DeadLetter { entry_id: QueueEntryId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrainReport {
    pub entity: EntityType,
    pub succeeded: Vec<QueueEntryId>,
    /// 処理されずに残ったエントリ（失敗したものを含む）
    pub failed: Vec<QueueEntryId>,
    pub coalesced: Vec<QueueEntryId>,
    pub halted: Option<DrainHalt>,
}

impl DrainReport {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            succeeded: Vec::new(),
            failed: Vec::new(),
            coalesced: Vec::new(),
            halted: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.halted.is_none()
    }

    pub fn applied_count(&self) -> usize {
        self.succeeded.len() + self.coalesced.len()
    }
}
