use crate::application::ports::reachability_probe::ReachabilityProbe;
use crate::shared::config::OfflineSyncConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// ヘルスチェック URL への GET で到達性を判定する。
///
/// 応答が返れば 4xx でも到達可能とみなす。5xx と通信エラーのみ到達不可。
pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            AppError::ConfigurationError(format!("Failed to build probe client: {err}"))
        })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &OfflineSyncConfig) -> Result<Self, AppError> {
        Self::new(config.probe_url(), config.connectivity.probe_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                let reachable = !status.is_server_error();
                tracing::debug!(
                    target: "offline::connectivity",
                    url = %self.url,
                    status = status.as_u16(),
                    reachable,
                    "reachability probe completed"
                );
                reachable
            }
            Err(err) => {
                tracing::debug!(
                    target: "offline::connectivity",
                    url = %self.url,
                    error = %err,
                    "reachability probe failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn respond_with(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if n == 0 || buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response =
                format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{addr}/rest/v1/")
    }

    #[tokio::test]
    async fn client_errors_still_count_as_reachable() {
        let url = respond_with("401 Unauthorized").await;
        let probe = HttpReachabilityProbe::new(url, Duration::from_secs(2)).unwrap();
        assert!(probe.probe().await);
    }

    #[tokio::test]
    async fn server_errors_and_refused_connections_are_unreachable() {
        let url = respond_with("503 Service Unavailable").await;
        let probe = HttpReachabilityProbe::new(url, Duration::from_secs(2)).unwrap();
        assert!(!probe.probe().await);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let probe =
            HttpReachabilityProbe::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        assert!(!probe.probe().await);
    }
}
