pub mod drainer;
pub mod entity_collection;
pub mod entity_locks;
pub mod offline_data_service;
pub mod reconciler;
mod remote_replay;
pub mod sync_coordinator;

pub use drainer::{DrainTrigger, Drainer};
pub use entity_collection::{EntityCollection, EntityDescriptor, TypedRecord};
pub use entity_locks::EntityLocks;
pub use offline_data_service::OfflineDataService;
pub use reconciler::Reconciler;
pub use sync_coordinator::{SyncCoordinator, SyncRunReport};
