use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Pending,
    /// リモートに繰り返し拒否されたもの。削除はせず、オペレーターの判断を待つ。
    DeadLetter,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryStatus::Pending => "pending",
            QueueEntryStatus::DeadLetter => "dead_letter",
        }
    }
}

impl TryFrom<&str> for QueueEntryStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(QueueEntryStatus::Pending),
            "dead_letter" => Ok(QueueEntryStatus::DeadLetter),
            other => Err(format!("Unknown queue entry status: {other}")),
        }
    }
}
