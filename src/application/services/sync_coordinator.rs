use super::drainer::{DrainTrigger, Drainer};
use super::reconciler::Reconciler;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::domain::entities::offline::{DrainReport, QueueEntry, SyncStatusSnapshot};
use crate::domain::value_objects::{EntityType, QueueEntryId};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::infrastructure::offline::DrainMetrics;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRunReport {
    pub drained: Vec<DrainReport>,
    pub pulled: Vec<EntityType>,
    pub errors: Vec<String>,
}

impl SyncRunReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.drained.iter().all(|report| report.is_complete())
    }
}

#[derive(Debug, Clone, Default)]
struct CoordinatorState {
    is_syncing: bool,
    last_sync_at: Option<DateTime<Utc>>,
}

/// 接続回復と手動同期のトリガーをまとめる。
pub struct SyncCoordinator {
    drainer: Arc<Drainer>,
    reconciler: Arc<Reconciler>,
    queue: Arc<dyn MutationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    metrics: Arc<DrainMetrics>,
    config: SyncConfig,
    registered: RwLock<BTreeSet<EntityType>>,
    state: RwLock<CoordinatorState>,
    run_gate: Mutex<()>,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        drainer: Arc<Drainer>,
        reconciler: Arc<Reconciler>,
        queue: Arc<dyn MutationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        metrics: Arc<DrainMetrics>,
        config: SyncConfig,
    ) -> Self {
        Self {
            drainer,
            reconciler,
            queue,
            monitor,
            metrics,
            config,
            registered: RwLock::new(BTreeSet::new()),
            state: RwLock::new(CoordinatorState::default()),
            run_gate: Mutex::new(()),
            watcher: std::sync::Mutex::new(None),
        }
    }

    /// 接続回復時や手動同期時に pull する対象として登録する
    pub async fn register_entity(&self, entity: EntityType) {
        self.registered.write().await.insert(entity);
    }

    pub async fn registered_entities(&self) -> Vec<EntityType> {
        self.registered.read().await.iter().cloned().collect()
    }

    /// 接続状態の監視を開始する。起動時点でオンラインなら残っているキューを一度流す。
    pub fn start(self: &Arc<Self>) {
        let mut rx = self.monitor.watch();
        let weak: Weak<Self> = Arc::downgrade(self);
        let start_online = rx.borrow_and_update().is_online();

        let handle = tokio::spawn(async move {
            if start_online {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.run_after_reconnect().await;
                }
            }

            // 値は変化時のみ送られるため、通知時にオンラインなら途中で一度はオフラインになっている
            while rx.changed().await.is_ok() {
                let online = rx.borrow_and_update().is_online();
                if !online {
                    continue;
                }

                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                tracing::info!(
                    target: "offline::coordinator",
                    "connectivity restored; draining outbound queue"
                );
                coordinator.run_after_reconnect().await;
            }
        });

        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
    }

    /// バックオフを無視して全レーンを送信し、登録済みエンティティを pull する
    pub async fn sync_now(&self) -> Result<SyncRunReport, AppError> {
        let mut entities: BTreeSet<EntityType> =
            self.queue.pending_entities().await?.into_iter().collect();
        entities.extend(self.registered_entities().await);
        Ok(self.run(entities, DrainTrigger::Manual, true).await)
    }

    pub async fn status(&self) -> Result<SyncStatusSnapshot, AppError> {
        let counts = self.queue.counts().await?;
        let state = self.state.read().await.clone();
        Ok(SyncStatusSnapshot {
            online: self.monitor.current(),
            is_syncing: state.is_syncing,
            pending_count: counts.pending,
            dead_letter_count: counts.dead_letter,
            pending_by_entity: counts.by_entity,
            last_sync_at: state.last_sync_at,
            metrics: self.metrics.snapshot(),
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<QueueEntry>, AppError> {
        self.drainer.dead_letters().await
    }

    pub async fn retry_dead_letter(&self, id: QueueEntryId) -> Result<bool, AppError> {
        self.drainer.retry_dead_letter(id).await
    }

    pub async fn discard_dead_letter(&self, id: QueueEntryId) -> Result<bool, AppError> {
        self.drainer.discard_dead_letter(id).await
    }

    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        tracing::debug!(target: "offline::coordinator", "sync coordinator stopped");
    }

    async fn run_after_reconnect(&self) {
        let entities = match self.queue.pending_entities().await {
            Ok(entities) => entities.into_iter().collect(),
            Err(err) => {
                tracing::error!(
                    target: "offline::coordinator",
                    error = %err,
                    "failed to list pending entities"
                );
                return;
            }
        };
        let report = self
            .run(entities, DrainTrigger::Reconnect, self.config.pull_after_reconnect)
            .await;
        if !report.is_clean() {
            tracing::warn!(
                target: "offline::coordinator",
                errors = report.errors.len(),
                "reconnect sync finished with pending work"
            );
        }
    }

    async fn run(
        &self,
        entities: BTreeSet<EntityType>,
        trigger: DrainTrigger,
        pull: bool,
    ) -> SyncRunReport {
        let _gate = self.run_gate.lock().await;
        self.state.write().await.is_syncing = true;

        let mut report = SyncRunReport::default();

        // エンティティ間は並行、エンティティ内は Drainer が直列に処理する
        let drains = join_all(
            entities
                .iter()
                .map(|entity| self.drainer.drain_entity(entity, trigger)),
        )
        .await;
        for (entity, result) in entities.iter().zip(drains) {
            match result {
                Ok(drained) => report.drained.push(drained),
                Err(err) => report.errors.push(format!("drain {entity}: {err}")),
            }
        }

        if pull {
            let registered = self.registered_entities().await;
            let pulls = join_all(
                registered
                    .iter()
                    .map(|entity| self.reconciler.sync_entity_from_remote(entity)),
            )
            .await;
            for (entity, result) in registered.into_iter().zip(pulls) {
                match result {
                    Ok(_) => report.pulled.push(entity),
                    Err(err) => report.errors.push(format!("pull {entity}: {err}")),
                }
            }
        }

        let mut state = self.state.write().await;
        state.is_syncing = false;
        if report.is_clean() {
            state.last_sync_at = Some(Utc::now());
        }
        drop(state);

        tracing::info!(
            target: "offline::coordinator",
            trigger = trigger.as_str(),
            lanes = report.drained.len(),
            pulled = report.pulled.len(),
            errors = report.errors.len(),
            "sync pass finished"
        );
        report
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
