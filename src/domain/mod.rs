pub mod entities;
pub mod value_objects;

pub use entities::offline::{QueueEntry, Record};
pub use value_objects::offline::{EntityType, MutationOperation, RecordId, RecordPayload};
