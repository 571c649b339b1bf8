pub mod connectivity_monitor;
pub mod http_probe;

pub use connectivity_monitor::{ConnectivityListener, ConnectivityMonitor, Subscription};
pub use http_probe::HttpReachabilityProbe;
