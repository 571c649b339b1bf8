pub mod config;
pub mod error;

pub use config::OfflineSyncConfig;
pub use error::{AppError, RemoteError, Result};
