use async_trait::async_trait;

/// リモートへの到達性を能動的に確認する
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}
