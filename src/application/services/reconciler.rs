use super::entity_locks::EntityLocks;
use super::remote_replay::with_timeout;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::record_store::RecordStore;
use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::entities::offline::{QueueEntry, Record};
use crate::domain::value_objects::{EntityType, MutationOperation, RecordId};
use crate::shared::error::AppError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// リモートの全件でローカルテーブルを置き換える（pull 側）。
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn MutationQueue>,
    gateway: Arc<dyn RemoteGateway>,
    locks: Arc<EntityLocks>,
    request_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn MutationQueue>,
        gateway: Arc<dyn RemoteGateway>,
        locks: Arc<EntityLocks>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            gateway,
            locks,
            request_timeout,
        }
    }

    /// 取得に失敗した場合はローカルを変更せずにエラーを返す。
    ///
    /// 置き換え後、未送信のキューエントリを追加順に重ねて楽観的な変更を残す。
    /// そのためローカルがリモートと完全に一致するのは、このエンティティの
    /// キューが空のときに限る。
    /// 戻り値はリモートから取得した件数。
    pub async fn sync_entity_from_remote(&self, entity: &EntityType) -> Result<usize, AppError> {
        let _guard = self.locks.acquire(entity).await;

        let fetched = with_timeout(self.request_timeout, self.gateway.select_all(entity))
            .await
            .map_err(|err| {
                tracing::debug!(
                    target: "offline::reconcile",
                    entity = %entity,
                    error = %err,
                    "remote fetch failed; local table left untouched"
                );
                AppError::from(err)
            })?;

        let fetched_at = Utc::now();
        let fetched_count = fetched.len();
        let mut records = Vec::with_capacity(fetched_count);
        for payload in fetched {
            match Record::from_remote(entity.clone(), payload, fetched_at) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        target: "offline::reconcile",
                        entity = %entity,
                        error = %err,
                        "skipping remote row without id"
                    );
                }
            }
        }

        let pending = self.queue.drain_in_order(Some(entity)).await?;
        let rebased = if pending.is_empty() {
            0
        } else {
            let local: HashMap<RecordId, Record> = self
                .store
                .list(entity)
                .await?
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect();
            rebase_pending(&mut records, &pending, &local)
        };

        self.store.replace_all(entity, &records).await?;

        tracing::info!(
            target: "offline::reconcile",
            entity = %entity,
            fetched = fetched_count,
            rebased,
            "entity reconciled from remote"
        );
        Ok(fetched_count)
    }

    /// ローカルに無いレコードをリモートから 1 件取得してキャッシュする。
    ///
    /// 同じ ID の未送信エントリがある場合（削除待ちなど）はローカルの状態を優先して `None`。
    pub async fn fetch_record(
        &self,
        entity: &EntityType,
        id: &RecordId,
    ) -> Result<Option<Record>, AppError> {
        let _guard = self.locks.acquire(entity).await;

        if let Some(local) = self.store.get(entity, id).await? {
            return Ok(Some(local));
        }
        if self.queue.has_entries_for(entity, id).await? {
            return Ok(None);
        }

        let fetched =
            with_timeout(self.request_timeout, self.gateway.select_by_id(entity, id)).await?;
        let Some(payload) = fetched else {
            return Ok(None);
        };

        let record = Record::from_remote(entity.clone(), payload, Utc::now())
            .map_err(AppError::ValidationError)?;
        if &record.id != id {
            return Err(AppError::ValidationError(format!(
                "Remote returned {} when asked for {id}",
                record.id
            )));
        }
        self.store.put(&record, true).await?;

        tracing::debug!(
            target: "offline::reconcile",
            entity = %entity,
            record_id = %id,
            "remote record cached locally"
        );
        Ok(Some(record))
    }
}

fn rebase_pending(
    records: &mut Vec<Record>,
    pending: &[QueueEntry],
    local: &HashMap<RecordId, Record>,
) -> usize {
    let mut applied = 0;
    for entry in pending {
        let position = records.iter().position(|r| r.id == entry.record_id);
        match entry.operation {
            MutationOperation::Create | MutationOperation::Update => {
                let Some(payload) = entry.data.clone() else {
                    continue;
                };
                let local_updated_at = local
                    .get(&entry.record_id)
                    .map(|r| r.local_updated_at)
                    .unwrap_or(entry.enqueued_at);
                let record = Record::new(
                    entry.entity.clone(),
                    entry.record_id.clone(),
                    payload,
                    false,
                    local_updated_at,
                );
                match position {
                    Some(index) => records[index] = record,
                    None => records.push(record),
                }
            }
            MutationOperation::Delete => {
                if let Some(index) = position {
                    records.remove(index);
                }
            }
        }
        applied += 1;
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::offline::QueueEntryDraft;
    use crate::domain::value_objects::RecordPayload;
    use crate::infrastructure::offline::{SqliteMutationQueue, SqliteRecordStore};
    use crate::infrastructure::remote::InMemoryRemoteGateway;
    use crate::shared::error::RemoteError;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    struct Fixture {
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn MutationQueue>,
        gateway: Arc<InMemoryRemoteGateway>,
        reconciler: Reconciler,
    }

    async fn setup() -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool.clone()));
        let queue: Arc<dyn MutationQueue> = Arc::new(SqliteMutationQueue::new(pool));
        let gateway = Arc::new(InMemoryRemoteGateway::new());
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            gateway.clone(),
            Arc::new(EntityLocks::new()),
            Duration::from_secs(1),
        );
        Fixture {
            store,
            queue,
            gateway,
            reconciler,
        }
    }

    fn produtos() -> EntityType {
        EntityType::new("produtos".into()).unwrap()
    }

    fn payload(value: serde_json::Value) -> RecordPayload {
        RecordPayload::new(value).unwrap()
    }

    fn local(id: &str, value: serde_json::Value, synced: bool) -> Record {
        Record::new(
            produtos(),
            RecordId::new(id.into()).unwrap(),
            payload(value),
            synced,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn pull_replaces_table_with_remote_truth() {
        let fx = setup().await;
        fx.store
            .put(&local("stale", json!({"id": "stale", "preco": 1}), true), true)
            .await
            .unwrap();
        fx.store
            .put(&local("p-1", json!({"id": "p-1", "preco": 5}), true), true)
            .await
            .unwrap();
        fx.gateway.seed(
            &produtos(),
            vec![
                payload(json!({"id": "p-1", "preco": 10})),
                payload(json!({"id": "p-2", "preco": 20})),
            ],
        );

        let fetched = fx.reconciler.sync_entity_from_remote(&produtos()).await.unwrap();
        assert_eq!(fetched, 2);

        let records = fx.store.list(&produtos()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.synced));
        for record in &records {
            assert_eq!(
                Some(&record.payload),
                fx.gateway.row(&produtos(), &record.id).as_ref()
            );
        }
    }

    #[tokio::test]
    async fn pending_mutations_stay_visible_after_pull() {
        let fx = setup().await;
        fx.gateway.seed(
            &produtos(),
            vec![
                payload(json!({"id": "p-1", "preco": 10})),
                payload(json!({"id": "p-2", "preco": 20})),
            ],
        );
        let edited = payload(json!({"id": "p-1", "preco": 12}));
        fx.queue
            .enqueue(QueueEntryDraft::update(
                produtos(),
                RecordId::new("p-1".into()).unwrap(),
                edited.clone(),
            ))
            .await
            .unwrap();
        fx.queue
            .enqueue(QueueEntryDraft::delete(
                produtos(),
                RecordId::new("p-2".into()).unwrap(),
            ))
            .await
            .unwrap();
        fx.queue
            .enqueue(QueueEntryDraft::create(
                produtos(),
                RecordId::new("p-3".into()).unwrap(),
                payload(json!({"id": "p-3", "preco": 30})),
            ))
            .await
            .unwrap();

        fx.reconciler.sync_entity_from_remote(&produtos()).await.unwrap();

        let records = fx.store.list(&produtos()).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p-1", "p-3"]);
        assert_eq!(records[0].payload, edited);
        assert!(records.iter().all(|r| !r.synced));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_local_table_untouched() {
        let fx = setup().await;
        let existing = local("p-1", json!({"id": "p-1", "preco": 5}), false);
        fx.store.put(&existing, false).await.unwrap();
        fx.gateway.set_reachable(false);

        let err = fx
            .reconciler
            .sync_entity_from_remote(&produtos())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(RemoteError::Transport(_))));

        let records = fx.store.list(&produtos()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].synced);
    }

    #[tokio::test]
    async fn fetch_record_caches_remote_row_but_respects_pending_delete() {
        let fx = setup().await;
        fx.gateway.seed(
            &produtos(),
            vec![
                payload(json!({"id": "p-1", "preco": 10})),
                payload(json!({"id": "p-2", "preco": 20})),
            ],
        );
        let p1 = RecordId::new("p-1".into()).unwrap();
        let p2 = RecordId::new("p-2".into()).unwrap();

        let fetched = fx.reconciler.fetch_record(&produtos(), &p1).await.unwrap();
        assert!(fetched.unwrap().synced);
        assert!(fx.store.get(&produtos(), &p1).await.unwrap().is_some());

        fx.queue
            .enqueue(QueueEntryDraft::delete(produtos(), p2.clone()))
            .await
            .unwrap();
        assert!(fx.reconciler.fetch_record(&produtos(), &p2).await.unwrap().is_none());
        assert!(fx.store.get(&produtos(), &p2).await.unwrap().is_none());
    }
}
