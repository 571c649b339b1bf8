#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use offline_sync_lib::application::ports::mutation_queue::MutationQueue;
use offline_sync_lib::application::ports::remote_gateway::RemoteGateway;
use offline_sync_lib::domain::value_objects::{
    ConnectivityState, EntityType, RecordId, RecordPayload,
};
use offline_sync_lib::infrastructure::database::ConnectionPool;
use offline_sync_lib::infrastructure::remote::InMemoryRemoteGateway;
use offline_sync_lib::shared::config::OfflineSyncConfig;
use offline_sync_lib::OfflineCore;
use serde_json::Value;

pub struct OfflineHarness {
    pub core: OfflineCore,
    pub gateway: Arc<InMemoryRemoteGateway>,
}

impl OfflineHarness {
    pub fn go_offline(&self) {
        self.core.monitor.set_state(ConnectivityState::Offline);
    }

    pub fn go_online(&self) {
        self.core.monitor.set_state(ConnectivityState::Online);
    }

    pub async fn pending_count(&self) -> u64 {
        self.core.queue.counts().await.expect("queue counts").pending
    }

    /// キューが空になるまで待つ
    pub async fn wait_until_drained(&self) {
        let queue = Arc::clone(&self.core.queue);
        wait_for(|| {
            let queue = Arc::clone(&queue);
            async move { queue.counts().await.map(|c| c.pending == 0).unwrap_or(false) }
        })
        .await;
    }
}

pub fn test_config() -> OfflineSyncConfig {
    let mut config = OfflineSyncConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    config.remote.request_timeout_ms = 1_000;
    config.sync.backoff_base_ms = 10;
    config.sync.backoff_max_ms = 100;
    config
}

pub async fn start_core(initial: ConnectivityState) -> OfflineHarness {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    start_core_with(test_config(), pool, initial).await
}

pub async fn start_core_with(
    config: OfflineSyncConfig,
    pool: ConnectionPool,
    initial: ConnectivityState,
) -> OfflineHarness {
    let gateway = Arc::new(InMemoryRemoteGateway::new());
    let remote: Arc<dyn RemoteGateway> = gateway.clone();
    let core = OfflineCore::bootstrap_with(config, pool, remote, None, initial)
        .await
        .expect("bootstrap offline core");
    OfflineHarness { core, gateway }
}

pub fn entity(name: &str) -> EntityType {
    EntityType::new(name.to_string()).expect("entity type")
}

pub fn record_id(value: &str) -> RecordId {
    RecordId::new(value.to_string()).expect("record id")
}

pub fn payload(value: Value) -> RecordPayload {
    RecordPayload::new(value).expect("payload")
}

pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}
