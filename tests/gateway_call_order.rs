mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::offline_support::{entity, payload, record_id, test_config};
use mockall::{mock, Sequence};
use offline_sync_lib::application::ports::remote_gateway::RemoteGateway;
use offline_sync_lib::domain::value_objects::{
    ConnectivityState, EntityType, RecordId, RecordPayload,
};
use offline_sync_lib::infrastructure::database::ConnectionPool;
use offline_sync_lib::shared::error::RemoteError;
use offline_sync_lib::OfflineCore;
use serde_json::json;

mock! {
    pub Gateway {}

    #[async_trait]
    impl RemoteGateway for Gateway {
        async fn select_all(&self, entity: &EntityType) -> Result<Vec<RecordPayload>, RemoteError>;
        async fn select_by_id(&self, entity: &EntityType, id: &RecordId) -> Result<Option<RecordPayload>, RemoteError>;
        async fn insert(&self, entity: &EntityType, payload: &RecordPayload) -> Result<RecordPayload, RemoteError>;
        async fn update(&self, entity: &EntityType, id: &RecordId, payload: &RecordPayload) -> Result<RecordPayload, RemoteError>;
        async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<(), RemoteError>;
    }
}

async fn core_with(gateway: MockGateway) -> OfflineCore {
    let pool = ConnectionPool::from_memory().await.unwrap();
    let mut config = test_config();
    config.sync.coalesce_updates = false;
    OfflineCore::bootstrap_with(
        config,
        pool,
        Arc::new(gateway),
        None,
        ConnectivityState::Offline,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn sync_now_replays_queue_in_enqueue_order() {
    let mut gateway = MockGateway::new();
    let mut seq = Sequence::new();

    gateway
        .expect_insert()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, payload| Ok(payload.clone()));
    gateway
        .expect_update()
        .withf(|_, id, payload| {
            id.as_str() == "c-1" && payload.get("nome") == Some(&json!("Ana Souza"))
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, payload| Ok(payload.clone()));
    gateway
        .expect_update()
        .withf(|_, _, payload| payload.get("nome") == Some(&json!("Ana S.")))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, payload| Ok(payload.clone()));
    gateway
        .expect_delete()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(RemoteError::NotFound("c-2".into())));
    gateway.expect_select_all().never();

    let core = core_with(gateway).await;
    let clientes = entity("clientes");
    let id = record_id("c-1");

    core.data
        .create(&clientes, payload(json!({"id": "c-1", "nome": "Ana"})))
        .await
        .unwrap();
    core.data
        .update(&clientes, &id, payload(json!({"nome": "Ana Souza"})))
        .await
        .unwrap();
    core.data
        .update(&clientes, &id, payload(json!({"nome": "Ana S."})))
        .await
        .unwrap();
    core.data.delete(&clientes, &record_id("c-2")).await.unwrap();

    let report = core.coordinator.sync_now().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.drained.len(), 1);
    assert_eq!(report.drained[0].succeeded.len(), 4);

    let status = core.coordinator.status().await.unwrap();
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.metrics.total_success, 1);
    core.shutdown().await;
}

#[tokio::test]
async fn create_conflict_on_retry_falls_back_to_update() {
    let mut gateway = MockGateway::new();
    let mut seq = Sequence::new();

    gateway
        .expect_insert()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(RemoteError::Conflict("duplicate key".into())));
    gateway
        .expect_update()
        .withf(|_, id, _| id.as_str() == "p-1")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, payload| Ok(payload.clone()));

    let core = core_with(gateway).await;
    let produtos = entity("produtos");
    core.data
        .create(&produtos, payload(json!({"id": "p-1", "preco": 10})))
        .await
        .unwrap();

    let report = core.coordinator.sync_now().await.unwrap();
    assert!(report.is_clean());
    let local = core
        .data
        .get_by_id(&produtos, &record_id("p-1"))
        .await
        .unwrap()
        .unwrap();
    assert!(local.synced);
    core.shutdown().await;
}
