mod common;

use chrono::Utc;
use common::offline_support::{entity, payload, record_id, start_core_with, test_config};
use offline_sync_lib::application::ports::mutation_queue::MutationQueue;
use offline_sync_lib::application::ports::record_store::RecordStore;
use offline_sync_lib::domain::entities::offline::{ListQuery, Record};
use offline_sync_lib::domain::value_objects::ConnectivityState;
use offline_sync_lib::infrastructure::database::ConnectionPool;
use offline_sync_lib::infrastructure::remote::RemoteOperation;
use serde_json::json;

fn file_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("offline.db").display())
}

#[tokio::test]
async fn records_created_offline_survive_restart_and_sync_in_creation_order() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);
    let clientes = entity("clientes");

    let mut created_ids = Vec::new();
    {
        let pool = ConnectionPool::new(&url, 2).await.unwrap();
        let harness = start_core_with(test_config(), pool, ConnectivityState::Offline).await;
        for n in 1..=5 {
            let record = harness
                .core
                .data
                .create(&clientes, payload(json!({"nome": format!("Cliente {n}")})))
                .await
                .unwrap();
            created_ids.push(record.id);
        }
        assert_eq!(harness.pending_count().await, 5);
        assert!(harness.gateway.calls().is_empty());
        harness.core.shutdown().await;
    }

    let pool = ConnectionPool::new(&url, 2).await.unwrap();
    let harness = start_core_with(test_config(), pool, ConnectivityState::Offline).await;

    let local = harness.core.data.list(&clientes, &ListQuery::new()).await.unwrap();
    assert_eq!(local.len(), 5);
    assert!(local.iter().all(|r| !r.synced));
    assert_eq!(harness.pending_count().await, 5);

    harness.go_online();
    harness.wait_until_drained().await;

    let inserted: Vec<_> = harness
        .gateway
        .write_calls()
        .into_iter()
        .filter(|call| call.operation == RemoteOperation::Insert)
        .filter_map(|call| call.record_id)
        .collect();
    assert_eq!(inserted, created_ids);
    assert_eq!(harness.gateway.rows(&clientes).len(), 5);
    harness.core.shutdown().await;
}

#[tokio::test]
async fn startup_requeues_unsynced_records_missing_from_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);
    let produtos = entity("produtos");

    {
        let pool = ConnectionPool::new(&url, 1).await.unwrap();
        let harness = start_core_with(test_config(), pool, ConnectivityState::Offline).await;
        // キュー追加前にプロセスが落ちた状態を再現する
        let orphan = Record::new(
            produtos.clone(),
            record_id("p-9"),
            payload(json!({"id": "p-9", "preco": 9})),
            false,
            Utc::now(),
        );
        harness.core.store.put(&orphan, false).await.unwrap();
        assert_eq!(harness.pending_count().await, 0);
        harness.core.shutdown().await;
    }

    let pool = ConnectionPool::new(&url, 1).await.unwrap();
    let harness = start_core_with(test_config(), pool, ConnectivityState::Offline).await;
    let queued = harness.core.queue.drain_in_order(Some(&produtos)).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].record_id, record_id("p-9"));

    let report = harness.core.reindex_job.reindex_once().await.unwrap();
    assert_eq!(report.unsynced_record_count, 1);
    assert_eq!(report.requeued_count, 0);

    harness.go_online();
    harness.wait_until_drained().await;
    assert_eq!(
        harness.gateway.row(&produtos, &record_id("p-9")).unwrap().get("preco"),
        Some(&json!(9))
    );
    harness.core.shutdown().await;
}
