use super::mappers::{payload_to_json, queue_entry_from_row};
use super::rows::QueueEntryRow;
use crate::application::ports::mutation_queue::{AttemptFailure, MutationQueue, QueueCounts};
use crate::domain::entities::offline::{QueueEntry, QueueEntryDraft};
use crate::domain::value_objects::{EntityType, QueueEntryId, QueueEntryStatus, RecordId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

const SELECT_ENTRY: &str = r#"
    SELECT id, entity, record_id, operation, payload, enqueued_at, attempt_count,
           last_attempt_at, next_attempt_at, last_error, status
    FROM outbound_queue
"#;

pub struct SqliteMutationQueue {
    pool: Pool<Sqlite>,
}

impl SqliteMutationQueue {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MutationQueue for SqliteMutationQueue {
    async fn enqueue(&self, draft: QueueEntryDraft) -> Result<QueueEntry, AppError> {
        if draft.operation.carries_payload() && draft.data.is_none() {
            return Err(AppError::ValidationError(format!(
                "{} mutation for {}/{} requires a payload",
                draft.operation.as_str(),
                draft.entity,
                draft.record_id
            )));
        }

        let payload = draft.data.as_ref().map(payload_to_json).transpose()?;
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO outbound_queue (entity, record_id, operation, payload, enqueued_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(draft.entity.as_str())
        .bind(draft.record_id.as_str())
        .bind(draft.operation.as_str())
        .bind(payload)
        .bind(now)
        .bind(QueueEntryStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        let id = QueueEntryId::new(result.last_insert_rowid()).map_err(AppError::Internal)?;
        let entry = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Queue entry {id} vanished after insert")))?;

        tracing::debug!(
            target: "offline::queue",
            entry_id = %entry.id,
            entity = %entry.entity,
            record_id = %entry.record_id,
            operation = entry.operation.as_str(),
            "mutation enqueued"
        );
        Ok(entry)
    }

    async fn drain_in_order(
        &self,
        entity: Option<&EntityType>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let rows = match entity {
            Some(entity) => {
                sqlx::query_as::<_, QueueEntryRow>(&format!(
                    "{SELECT_ENTRY} WHERE entity = ?1 ORDER BY id ASC"
                ))
                .bind(entity.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, QueueEntryRow>(&format!("{SELECT_ENTRY} ORDER BY id ASC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(queue_entry_from_row).collect()
    }

    async fn remove(&self, id: QueueEntryId) -> Result<(), AppError> {
        sqlx::query("DELETE FROM outbound_queue WHERE id = ?1")
            .bind(id.value())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: QueueEntryId) -> Result<Option<QueueEntry>, AppError> {
        let row = sqlx::query_as::<_, QueueEntryRow>(&format!("{SELECT_ENTRY} WHERE id = ?1"))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;

        row.map(queue_entry_from_row).transpose()
    }

    async fn record_failure(
        &self,
        id: QueueEntryId,
        failure: &AttemptFailure,
    ) -> Result<(), AppError> {
        let status = if failure.dead_letter {
            QueueEntryStatus::DeadLetter
        } else {
            QueueEntryStatus::Pending
        };

        let result = sqlx::query(
            r#"
            UPDATE outbound_queue
            SET attempt_count = attempt_count + 1,
                last_attempt_at = ?1,
                next_attempt_at = ?2,
                last_error = ?3,
                status = ?4
            WHERE id = ?5
            "#,
        )
        .bind(failure.attempted_at.timestamp_millis())
        .bind(failure.next_attempt_at.map(|at| at.timestamp_millis()))
        .bind(&failure.error)
        .bind(status.as_str())
        .bind(id.value())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Queue entry {id} not found")));
        }
        Ok(())
    }

    async fn requeue(&self, id: QueueEntryId) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE outbound_queue
            SET status = ?1,
                attempt_count = 0,
                next_attempt_at = NULL
            WHERE id = ?2 AND status = ?3
            "#,
        )
        .bind(QueueEntryStatus::Pending.as_str())
        .bind(id.value())
        .bind(QueueEntryStatus::DeadLetter.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_entries_for(&self, entity: &EntityType, id: &RecordId) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbound_queue WHERE entity = ?1 AND record_id = ?2",
        )
        .bind(entity.as_str())
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn pending_entities(&self) -> Result<Vec<EntityType>, AppError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT entity FROM outbound_queue WHERE status = ?1 ORDER BY entity",
        )
        .bind(QueueEntryStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        names
            .into_iter()
            .map(|name| EntityType::new(name).map_err(AppError::ValidationError))
            .collect()
    }

    async fn dead_letters(&self) -> Result<Vec<QueueEntry>, AppError> {
        let rows = sqlx::query_as::<_, QueueEntryRow>(&format!(
            "{SELECT_ENTRY} WHERE status = ?1 ORDER BY id ASC"
        ))
        .bind(QueueEntryStatus::DeadLetter.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(queue_entry_from_row).collect()
    }

    async fn counts(&self) -> Result<QueueCounts, AppError> {
        let rows = sqlx::query(
            "SELECT entity, status, COUNT(*) AS total FROM outbound_queue GROUP BY entity, status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let entity: String = row.try_get("entity")?;
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let total = total.max(0) as u64;

            match QueueEntryStatus::try_from(status.as_str()).map_err(AppError::ValidationError)? {
                QueueEntryStatus::Pending => {
                    counts.pending += total;
                    *counts.by_entity.entry(entity).or_insert(0) += total;
                }
                QueueEntryStatus::DeadLetter => counts.dead_letter += total,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{MutationOperation, RecordPayload};
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_queue() -> SqliteMutationQueue {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        SqliteMutationQueue::new(pool)
    }

    fn entity(name: &str) -> EntityType {
        EntityType::new(name.into()).unwrap()
    }

    fn record_id(value: &str) -> RecordId {
        RecordId::new(value.into()).unwrap()
    }

    fn payload(value: serde_json::Value) -> RecordPayload {
        RecordPayload::new(value).unwrap()
    }

    #[tokio::test]
    async fn entries_come_back_in_enqueue_order() {
        let queue = setup_queue().await;
        let produtos = entity("produtos");

        let first = queue
            .enqueue(QueueEntryDraft::create(
                produtos.clone(),
                record_id("p-1"),
                payload(json!({"id": "p-1", "preco": 10})),
            ))
            .await
            .unwrap();
        queue
            .enqueue(QueueEntryDraft::create(
                entity("clientes"),
                record_id("c-1"),
                payload(json!({"id": "c-1"})),
            ))
            .await
            .unwrap();
        let third = queue
            .enqueue(QueueEntryDraft::delete(produtos.clone(), record_id("p-1")))
            .await
            .unwrap();

        let lane = queue.drain_in_order(Some(&produtos)).await.unwrap();
        let ids: Vec<_> = lane.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
        assert_eq!(lane[1].operation, MutationOperation::Delete);
        assert!(lane[1].data.is_none());

        let all = queue.drain_in_order(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn enqueue_rejects_missing_payload() {
        let queue = setup_queue().await;
        let draft = QueueEntryDraft {
            entity: entity("produtos"),
            record_id: record_id("p-1"),
            operation: MutationOperation::Update,
            data: None,
        };
        assert!(matches!(
            queue.enqueue(draft).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn failures_update_bookkeeping_and_dead_letters_can_be_requeued() {
        let queue = setup_queue().await;
        let entry = queue
            .enqueue(QueueEntryDraft::update(
                entity("produtos"),
                record_id("p-1"),
                payload(json!({"preco": -1})),
            ))
            .await
            .unwrap();

        let now = Utc::now();
        queue
            .record_failure(
                entry.id,
                &AttemptFailure {
                    attempted_at: now,
                    next_attempt_at: Some(now + Duration::seconds(5)),
                    error: "timeout".into(),
                    dead_letter: false,
                },
            )
            .await
            .unwrap();

        let loaded = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(loaded.attempt_count, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("timeout"));
        assert!(loaded.is_backing_off(now));
        assert_eq!(loaded.data, entry.data);

        assert!(!queue.requeue(entry.id).await.unwrap());

        queue
            .record_failure(
                entry.id,
                &AttemptFailure {
                    attempted_at: now,
                    next_attempt_at: None,
                    error: "rejected".into(),
                    dead_letter: true,
                },
            )
            .await
            .unwrap();

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(queue.pending_entities().await.unwrap().is_empty());

        assert!(queue.requeue(entry.id).await.unwrap());
        let revived = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(revived.attempt_count, 0);
        assert!(!revived.is_dead_letter());
        assert!(revived.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn counts_and_lookup_by_record() {
        let queue = setup_queue().await;
        let produtos = entity("produtos");
        let a = queue
            .enqueue(QueueEntryDraft::delete(produtos.clone(), record_id("p-1")))
            .await
            .unwrap();
        queue
            .enqueue(QueueEntryDraft::delete(produtos.clone(), record_id("p-2")))
            .await
            .unwrap();
        queue
            .enqueue(QueueEntryDraft::delete(entity("clientes"), record_id("c-1")))
            .await
            .unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.dead_letter, 0);
        assert_eq!(counts.by_entity.get("produtos"), Some(&2));

        assert!(queue.has_entries_for(&produtos, &record_id("p-1")).await.unwrap());
        queue.remove(a.id).await.unwrap();
        assert!(!queue.has_entries_for(&produtos, &record_id("p-1")).await.unwrap());

        let entities = queue.pending_entities().await.unwrap();
        assert_eq!(entities, vec![entity("clientes"), produtos]);
    }
}
