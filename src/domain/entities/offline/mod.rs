pub mod drain_report;
pub mod list_query;
pub mod queue_entry;
pub mod record;
pub mod sync_status;

pub use drain_report::{DrainHalt, DrainReport};
pub use list_query::{ListQuery, OrderBy, RecordFilter};
pub use queue_entry::{QueueEntry, QueueEntryDraft};
pub use record::Record;
pub use sync_status::{DrainMetricsSnapshot, DrainOutcomeStatus, SyncStatusSnapshot};
