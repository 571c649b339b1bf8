mod mappers;
pub mod metrics;
pub mod reindex_job;
mod rows;
pub mod sqlite_mutation_queue;
pub mod sqlite_record_store;

pub use metrics::{DrainMetrics, DrainOutcomeMetadata};
pub use reindex_job::{OfflineReindexJob, OfflineReindexReport};
pub use sqlite_mutation_queue::SqliteMutationQueue;
pub use sqlite_record_store::SqliteRecordStore;
