use crate::domain::entities::offline::Record;
use crate::domain::value_objects::{EntityType, RecordId};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// エンティティ種別ごとのローカル永続テーブル。
///
/// `put` / `delete` は永続化が完了してから戻る。フィルタ処理は持たない。
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, entity: &EntityType, id: &RecordId) -> Result<Option<Record>, AppError>;
    async fn list(&self, entity: &EntityType) -> Result<Vec<Record>, AppError>;
    async fn put(&self, record: &Record, synced: bool) -> Result<(), AppError>;
    async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<bool, AppError>;
    async fn clear(&self, entity: &EntityType) -> Result<u64, AppError>;
    /// テーブル全体を `records` で置き換える（単一トランザクション）
    async fn replace_all(&self, entity: &EntityType, records: &[Record]) -> Result<(), AppError>;
    async fn list_unsynced(&self, entity: Option<&EntityType>) -> Result<Vec<Record>, AppError>;
}
