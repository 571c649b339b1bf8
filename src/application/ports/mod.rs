pub mod mutation_queue;
pub mod reachability_probe;
pub mod record_store;
pub mod remote_gateway;

pub use mutation_queue::{AttemptFailure, MutationQueue, QueueCounts};
pub use reachability_probe::ReachabilityProbe;
pub use record_store::RecordStore;
pub use remote_gateway::RemoteGateway;
