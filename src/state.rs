use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::reachability_probe::ReachabilityProbe;
use crate::application::ports::record_store::RecordStore;
use crate::application::ports::remote_gateway::RemoteGateway;
use crate::application::services::{
    Drainer, EntityCollection, EntityDescriptor, EntityLocks, OfflineDataService, Reconciler,
    SyncCoordinator,
};
use crate::domain::value_objects::ConnectivityState;
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::network::{ConnectivityMonitor, HttpReachabilityProbe};
use crate::infrastructure::offline::{
    DrainMetrics, OfflineReindexJob, SqliteMutationQueue, SqliteRecordStore,
};
use crate::infrastructure::remote::HttpRemoteGateway;
use crate::shared::config::OfflineSyncConfig;
use crate::shared::error::AppError;
use std::sync::Arc;

/// オフライン同期コア全体の状態を管理する構造体
#[derive(Clone)]
pub struct OfflineCore {
    pub config: OfflineSyncConfig,
    pub pool: ConnectionPool,
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<dyn MutationQueue>,
    pub gateway: Arc<dyn RemoteGateway>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub metrics: Arc<DrainMetrics>,
    pub data: Arc<OfflineDataService>,
    pub coordinator: Arc<SyncCoordinator>,
    pub reindex_job: Arc<OfflineReindexJob>,
}

impl OfflineCore {
    /// 設定どおりに SQLite・HTTP ゲートウェイ・到達性プローブを組み立てて起動する。
    ///
    /// 接続状態はオフラインから始め、プローブが成功した時点でオンラインへ切り替わる。
    pub async fn bootstrap(config: OfflineSyncConfig) -> anyhow::Result<Self> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database.url, config.database.max_connections)
            .await
            .map_err(AppError::from)?;
        let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpRemoteGateway::new(&config.remote)?);
        let probe: Arc<dyn ReachabilityProbe> =
            Arc::new(HttpReachabilityProbe::from_config(&config)?);

        let core = Self::bootstrap_with(
            config,
            pool,
            gateway,
            Some(probe),
            ConnectivityState::Offline,
        )
        .await?;

        core.monitor.probe_now().await;
        core.monitor.spawn_probe_loop(core.config.connectivity.probe_interval());
        Ok(core)
    }

    /// 依存を差し替えて組み立てる（テストや独自ゲートウェイ用）
    pub async fn bootstrap_with(
        config: OfflineSyncConfig,
        pool: ConnectionPool,
        gateway: Arc<dyn RemoteGateway>,
        probe: Option<Arc<dyn ReachabilityProbe>>,
        initial: ConnectivityState,
    ) -> anyhow::Result<Self> {
        pool.migrate().await.map_err(AppError::from)?;

        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::new(pool.get_pool().clone()));
        let queue: Arc<dyn MutationQueue> =
            Arc::new(SqliteMutationQueue::new(pool.get_pool().clone()));
        let monitor = ConnectivityMonitor::new(initial, probe);
        let metrics = Arc::new(DrainMetrics::new());
        let locks = Arc::new(EntityLocks::new());
        let request_timeout = config.remote.request_timeout();

        let drainer = Arc::new(Drainer::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&gateway),
            Arc::clone(&locks),
            Arc::clone(&metrics),
            config.sync.clone(),
            request_timeout,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&gateway),
            Arc::clone(&locks),
            request_timeout,
        ));
        let data = Arc::new(OfflineDataService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&monitor),
            Arc::clone(&drainer),
            Arc::clone(&reconciler),
            locks,
            config.sync.clone(),
        ));
        let coordinator = Arc::new(SyncCoordinator::new(
            drainer,
            reconciler,
            Arc::clone(&queue),
            Arc::clone(&monitor),
            Arc::clone(&metrics),
            config.sync.clone(),
        ));

        // 前回終了時に取りこぼした未同期レコードをキューへ戻してから送信を始める
        let reindex_job = OfflineReindexJob::create(Arc::clone(&store), Arc::clone(&queue));
        let report = reindex_job.reindex_once().await?;
        tracing::info!(
            target: "offline::reindex",
            unsynced = report.unsynced_record_count,
            requeued = report.requeued_count,
            pending = report.pending_queue_count,
            dead_letters = report.dead_letter_count,
            "startup reindex finished"
        );

        coordinator.start();

        Ok(Self {
            config,
            pool,
            store,
            queue,
            gateway,
            monitor,
            metrics,
            data,
            coordinator,
            reindex_job,
        })
    }

    pub fn collection<T: EntityDescriptor>(&self) -> Result<EntityCollection<T>, AppError> {
        self.data.collection::<T>()
    }

    pub fn reindex(&self) {
        self.reindex_job.trigger();
    }

    /// 監視タスクを止め、裏の送信を待ってから DB を閉じる
    pub async fn shutdown(&self) {
        self.coordinator.shutdown();
        self.monitor.stop_probe_loop();
        self.data.settle().await;
        self.pool.close().await;
        tracing::info!(target: "offline::coordinator", "offline core shut down");
    }
}
