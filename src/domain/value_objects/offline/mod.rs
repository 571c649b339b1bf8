pub mod connectivity_state;
pub mod entity_type;
pub mod mutation_operation;
pub mod queue_entry_id;
pub mod queue_entry_status;
pub mod record_id;
pub mod record_payload;

pub use connectivity_state::ConnectivityState;
pub use entity_type::EntityType;
pub use mutation_operation::MutationOperation;
pub use queue_entry_id::QueueEntryId;
pub use queue_entry_status::QueueEntryStatus;
pub use record_id::RecordId;
pub use record_payload::RecordPayload;
