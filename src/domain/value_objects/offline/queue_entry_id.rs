use serde::{Deserialize, Serialize};
use std::fmt;

/// キューの通し番号。値の大小がそのまま再送順になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueEntryId(i64);

impl QueueEntryId {
    pub fn new(value: i64) -> Result<Self, String> {
        if value <= 0 {
            return Err("Queue entry id must be positive".to_string());
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<QueueEntryId> for i64 {
    fn from(id: QueueEntryId) -> Self {
        id.0
    }
}
