use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ローカルストアに保持されるレコード。
///
/// `synced` はリモートがこのペイロードそのものを確認済みの場合のみ `true`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub entity: EntityType,
    pub id: RecordId,
    pub payload: RecordPayload,
    pub synced: bool,
    pub local_updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(
        entity: EntityType,
        id: RecordId,
        payload: RecordPayload,
        synced: bool,
        local_updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            id,
            payload,
            synced,
            local_updated_at,
        }
    }

    /// リモートから取得したペイロードをそのまま同期済みレコードにする
    pub fn from_remote(
        entity: EntityType,
        payload: RecordPayload,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        let id = payload
            .record_id()
            .ok_or_else(|| format!("Remote {entity} payload is missing an id"))?;
        Ok(Self::new(entity, id, payload, true, fetched_at))
    }

    pub fn mark_synced(&mut self, canonical: Option<RecordPayload>) {
        if let Some(payload) = canonical {
            self.payload = payload;
        }
        self.synced = true;
    }
}
