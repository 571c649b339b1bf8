pub mod http_gateway;
pub mod memory_gateway;

pub use http_gateway::HttpRemoteGateway;
pub use memory_gateway::{InMemoryRemoteGateway, RemoteCall, RemoteOperation};
