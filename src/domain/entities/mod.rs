pub mod offline;

pub use offline::{
    DrainHalt, DrainMetricsSnapshot, DrainOutcomeStatus, DrainReport, ListQuery, OrderBy,
    QueueEntry, QueueEntryDraft, Record, RecordFilter, SyncStatusSnapshot,
};
