use super::mappers::{payload_to_json, record_from_row};
use super::rows::LocalRecordRow;
use crate::application::ports::record_store::RecordStore;
use crate::domain::entities::offline::Record;
use crate::domain::value_objects::{EntityType, RecordId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

const UPSERT_RECORD: &str = r#"
    INSERT INTO local_records (entity, record_id, payload, synced, local_updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(entity, record_id) DO UPDATE SET
        payload = excluded.payload,
        synced = excluded.synced,
        local_updated_at = excluded.local_updated_at
"#;

pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

impl SqliteRecordStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, entity: &EntityType, id: &RecordId) -> Result<Option<Record>, AppError> {
        let row = sqlx::query_as::<_, LocalRecordRow>(
            r#"
            SELECT entity, record_id, payload, synced, local_updated_at
            FROM local_records
            WHERE entity = ?1 AND record_id = ?2
            "#,
        )
        .bind(entity.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn list(&self, entity: &EntityType) -> Result<Vec<Record>, AppError> {
        let rows = sqlx::query_as::<_, LocalRecordRow>(
            r#"
            SELECT entity, record_id, payload, synced, local_updated_at
            FROM local_records
            WHERE entity = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(entity.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn put(&self, record: &Record, synced: bool) -> Result<(), AppError> {
        let payload = payload_to_json(&record.payload)?;

        sqlx::query(UPSERT_RECORD)
            .bind(record.entity.as_str())
            .bind(record.id.as_str())
            .bind(&payload)
            .bind(synced)
            .bind(record.local_updated_at.timestamp_millis())
            .execute(&self.pool)
            .await?;

        tracing::trace!(
            target: "offline::store",
            entity = %record.entity,
            record_id = %record.id,
            synced,
            "record persisted"
        );
        Ok(())
    }

    async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM local_records WHERE entity = ?1 AND record_id = ?2")
            .bind(entity.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, entity: &EntityType) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM local_records WHERE entity = ?1")
            .bind(entity.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn replace_all(&self, entity: &EntityType, records: &[Record]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM local_records WHERE entity = ?1")
            .bind(entity.as_str())
            .execute(&mut *tx)
            .await?;

        for record in records {
            if &record.entity != entity {
                return Err(AppError::ValidationError(format!(
                    "Record {} belongs to {}, not {}",
                    record.id, record.entity, entity
                )));
            }
            let payload = payload_to_json(&record.payload)?;
            sqlx::query(UPSERT_RECORD)
                .bind(entity.as_str())
                .bind(record.id.as_str())
                .bind(&payload)
                .bind(record.synced)
                .bind(record.local_updated_at.timestamp_millis())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            target: "offline::store",
            entity = %entity,
            count = records.len(),
            "entity table replaced"
        );
        Ok(())
    }

    async fn list_unsynced(&self, entity: Option<&EntityType>) -> Result<Vec<Record>, AppError> {
        let rows = match entity {
            Some(entity) => {
                sqlx::query_as::<_, LocalRecordRow>(
                    r#"
                    SELECT entity, record_id, payload, synced, local_updated_at
                    FROM local_records
                    WHERE entity = ?1 AND synced = 0
                    ORDER BY local_updated_at ASC
                    "#,
                )
                .bind(entity.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LocalRecordRow>(
                    r#"
                    SELECT entity, record_id, payload, synced, local_updated_at
                    FROM local_records
                    WHERE synced = 0
                    ORDER BY local_updated_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(record_from_row).collect()
    }
}
