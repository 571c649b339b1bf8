pub mod ports;
pub mod services;

pub use services::{
    DrainTrigger, Drainer, EntityCollection, EntityDescriptor, OfflineDataService, Reconciler,
    SyncCoordinator, SyncRunReport, TypedRecord,
};
