use thiserror::Error;

/// リモートゲートウェイ呼び出しの失敗分類。
///
/// `Transport` / `Timeout` / `Server` は再試行可能、`Rejected` はサーバーが
/// 受け付けた上で拒否したもの（バリデーション・権限）を表す。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Remote call timed out after {0} ms")]
    Timeout(u64),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport(_) | RemoteError::Timeout(_) | RemoteError::Server(_)
        )
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_classification() {
        assert!(RemoteError::Transport("refused".into()).is_retryable());
        assert!(RemoteError::Timeout(500).is_retryable());
        assert!(RemoteError::Server("502".into()).is_retryable());
        assert!(!RemoteError::NotFound("x".into()).is_retryable());

        let rejected = RemoteError::Rejected {
            status: 422,
            message: "preco must be positive".into(),
        };
        assert!(rejected.is_rejection());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn app_error_wraps_remote_error() {
        let err: AppError = RemoteError::Conflict("duplicate key".into()).into();
        assert_eq!(err.to_string(), "Remote error: Conflict: duplicate key");
    }
}
