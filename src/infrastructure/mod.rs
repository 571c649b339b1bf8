pub mod database;
pub mod network;
pub mod offline;
pub mod remote;

pub use database::ConnectionPool;
pub use network::{ConnectivityMonitor, HttpReachabilityProbe};
pub use offline::{OfflineReindexJob, SqliteMutationQueue, SqliteRecordStore};
pub use remote::{HttpRemoteGateway, InMemoryRemoteGateway};
