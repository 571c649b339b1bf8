use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocalRecordRow {
    pub entity: String,
    pub record_id: String,
    pub payload: String,
    pub synced: bool,
    pub local_updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueEntryRow {
    pub id: i64,
    pub entity: String,
    pub record_id: String,
    pub operation: String,
    pub payload: Option<String>,
    pub enqueued_at: i64,
    pub attempt_count: i64,
    pub last_attempt_at: Option<i64>,
    pub next_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    pub status: String,
}
