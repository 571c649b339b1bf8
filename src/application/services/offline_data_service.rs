use super::drainer::{DrainTrigger, Drainer};
use super::entity_collection::{EntityCollection, EntityDescriptor};
use super::entity_locks::EntityLocks;
use super::reconciler::Reconciler;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::record_store::RecordStore;
use crate::domain::entities::offline::{ListQuery, QueueEntryDraft, Record};
use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// UI 層に公開する CRUD の窓口。
///
/// 書き込みは常にローカルへ即時反映し、送信キューに積んだうえで、オンラインなら
/// 裏でそのレーンを送信する。リモートの失敗は呼び出し元へ伝播しない。
pub struct OfflineDataService {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn MutationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    drainer: Arc<Drainer>,
    reconciler: Arc<Reconciler>,
    locks: Arc<EntityLocks>,
    config: SyncConfig,
    background: Mutex<JoinSet<()>>,
}

impl OfflineDataService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn MutationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        drainer: Arc<Drainer>,
        reconciler: Arc<Reconciler>,
        locks: Arc<EntityLocks>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            queue,
            monitor,
            drainer,
            reconciler,
            locks,
            config,
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn collection<T: EntityDescriptor>(
        self: &Arc<Self>,
    ) -> Result<EntityCollection<T>, AppError> {
        EntityCollection::new(Arc::clone(self))
    }

    /// `id` / `created_at` / `updated_at` が無ければ補って作成する
    pub async fn create(
        &self,
        entity: &EntityType,
        partial: RecordPayload,
    ) -> Result<Record, AppError> {
        let id = partial.record_id().unwrap_or_else(RecordId::generate);
        let now = Utc::now();
        let payload = partial.ensure_identity(&id, now);
        let record = Record::new(entity.clone(), id.clone(), payload.clone(), false, now);

        {
            let _guard = self.locks.acquire(entity).await;
            if self.store.get(entity, &id).await?.is_some() {
                return Err(AppError::ValidationError(format!(
                    "{entity} record {id} already exists"
                )));
            }
            let draft = QueueEntryDraft::create(entity.clone(), id.clone(), payload);
            self.write_through(draft, || self.store.put(&record, false))
                .await?;
        }

        tracing::debug!(
            target: "offline::facade",
            entity = %entity,
            record_id = %id,
            "record created locally"
        );
        self.schedule_push(entity).await;
        Ok(record)
    }

    /// ローカルに無い ID なら `None`
    pub async fn update(
        &self,
        entity: &EntityType,
        id: &RecordId,
        patch: RecordPayload,
    ) -> Result<Option<Record>, AppError> {
        let record = {
            let _guard = self.locks.acquire(entity).await;
            let Some(current) = self.store.get(entity, id).await? else {
                return Ok(None);
            };

            let now = Utc::now();
            let payload = current.payload.merge_patch(&patch).touch(now);
            let record = Record::new(entity.clone(), id.clone(), payload.clone(), false, now);

            let draft = QueueEntryDraft::update(entity.clone(), id.clone(), payload);
            self.write_through(draft, || self.store.put(&record, false))
                .await?;
            record
        };

        tracing::debug!(
            target: "offline::facade",
            entity = %entity,
            record_id = %id,
            "record updated locally"
        );
        self.schedule_push(entity).await;
        Ok(Some(record))
    }

    /// ローカルから即時に削除する。ローカルに無い ID でもリモート削除は積む。
    pub async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<(), AppError> {
        {
            let _guard = self.locks.acquire(entity).await;
            let draft = QueueEntryDraft::delete(entity.clone(), id.clone());
            self.write_through(draft, || async {
                self.store.delete(entity, id).await.map(|_| ())
            })
            .await?;
        }

        tracing::debug!(
            target: "offline::facade",
            entity = %entity,
            record_id = %id,
            "record deleted locally"
        );
        self.schedule_push(entity).await;
        Ok(())
    }

    /// オンラインかつ `reconcile_on_list` の場合は先にリモートから取り込む。
    /// 取り込みに失敗してもローカルの内容を返す。
    pub async fn list(
        &self,
        entity: &EntityType,
        query: &ListQuery,
    ) -> Result<Vec<Record>, AppError> {
        if self.config.reconcile_on_list && self.monitor.current() {
            if let Err(err) = self.reconciler.sync_entity_from_remote(entity).await {
                tracing::debug!(
                    target: "offline::facade",
                    entity = %entity,
                    error = %err,
                    "reconcile before list failed; serving local records"
                );
            }
        }

        let records = self.store.list(entity).await?;
        Ok(query.apply(records))
    }

    pub async fn get_by_id(
        &self,
        entity: &EntityType,
        id: &RecordId,
    ) -> Result<Option<Record>, AppError> {
        if let Some(record) = self.store.get(entity, id).await? {
            return Ok(Some(record));
        }
        if !self.monitor.current() {
            return Ok(None);
        }

        match self.reconciler.fetch_record(entity, id).await {
            Ok(record) => Ok(record),
            Err(AppError::Remote(err)) => {
                tracing::debug!(
                    target: "offline::facade",
                    entity = %entity,
                    record_id = %id,
                    error = %err,
                    "remote point-fetch failed"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 裏で走っている送信をすべて待つ
    pub async fn settle(&self) {
        loop {
            let mut pending = {
                let mut guard = self.background.lock().await;
                std::mem::take(&mut *guard)
            };
            if pending.is_empty() {
                break;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(err) = result {
                    tracing::warn!(
                        target: "offline::facade",
                        error = %err,
                        "background drain task panicked or was cancelled"
                    );
                }
            }
        }
    }

    // キューに積んでからローカルへ書く。ローカル書き込みが失敗したらエントリを取り消す。
    async fn write_through<F, Fut>(&self, draft: QueueEntryDraft, write: F) -> Result<(), AppError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), AppError>>,
    {
        let entry = self.queue.enqueue(draft).await?;
        if let Err(err) = write().await {
            if let Err(rollback_err) = self.queue.remove(entry.id).await {
                tracing::error!(
                    target: "offline::facade",
                    entry_id = %entry.id,
                    error = %rollback_err,
                    "failed to roll back queue entry after local write failure"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    async fn schedule_push(&self, entity: &EntityType) {
        if !self.monitor.current() {
            tracing::debug!(
                target: "offline::facade",
                entity = %entity,
                "offline; mutation stays queued"
            );
            return;
        }

        let drainer = Arc::clone(&self.drainer);
        let entity = entity.clone();
        let mut background = self.background.lock().await;
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            if let Err(err) = drainer.drain_entity(&entity, DrainTrigger::Mutation).await {
                tracing::warn!(
                    target: "offline::facade",
                    entity = %entity,
                    error = %err,
                    "background drain failed"
                );
            }
        });
    }
}
