use super::rows::{LocalRecordRow, QueueEntryRow};
use crate::domain::entities::offline::{QueueEntry, Record};
use crate::domain::value_objects::{
    EntityType, MutationOperation, QueueEntryId, QueueEntryStatus, RecordId, RecordPayload,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};

pub fn record_from_row(row: LocalRecordRow) -> Result<Record, AppError> {
    let entity = EntityType::new(row.entity).map_err(AppError::ValidationError)?;
    let id = RecordId::new(row.record_id).map_err(AppError::ValidationError)?;
    let payload =
        RecordPayload::from_json_str(&row.payload).map_err(AppError::SerializationError)?;

    Ok(Record::new(
        entity,
        id,
        payload,
        row.synced,
        timestamp_from_millis(row.local_updated_at)?,
    ))
}

pub fn queue_entry_from_row(row: QueueEntryRow) -> Result<QueueEntry, AppError> {
    let operation =
        MutationOperation::try_from(row.operation.as_str()).map_err(AppError::ValidationError)?;
    let status =
        QueueEntryStatus::try_from(row.status.as_str()).map_err(AppError::ValidationError)?;
    let data = row
        .payload
        .as_deref()
        .map(RecordPayload::from_json_str)
        .transpose()
        .map_err(AppError::SerializationError)?;

    Ok(QueueEntry {
        id: QueueEntryId::new(row.id).map_err(AppError::ValidationError)?,
        entity: EntityType::new(row.entity).map_err(AppError::ValidationError)?,
        record_id: RecordId::new(row.record_id).map_err(AppError::ValidationError)?,
        operation,
        data,
        enqueued_at: timestamp_from_millis(row.enqueued_at)?,
        attempt_count: u32::try_from(row.attempt_count)
            .map_err(|_| AppError::Internal("Attempt count was negative".to_string()))?,
        last_attempt_at: optional_timestamp(row.last_attempt_at)?,
        next_attempt_at: optional_timestamp(row.next_attempt_at)?,
        last_error: row.last_error,
        status,
    })
}

pub fn payload_to_json(payload: &RecordPayload) -> Result<String, AppError> {
    serde_json::to_string(payload.as_json())
        .map_err(|err| AppError::SerializationError(err.to_string()))
}

pub fn timestamp_from_millis(value: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| AppError::ValidationError(format!("Invalid timestamp: {value}")))
}

fn optional_timestamp(value: Option<i64>) -> Result<Option<DateTime<Utc>>, AppError> {
    value.map(timestamp_from_millis).transpose()
}
