pub mod offline;

pub use offline::{
    ConnectivityState, EntityType, MutationOperation, QueueEntryId, QueueEntryStatus, RecordId,
    RecordPayload,
};
