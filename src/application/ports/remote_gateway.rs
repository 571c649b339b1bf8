use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use crate::shared::error::RemoteError;
use async_trait::async_trait;

/// ホスト側データベースへの呼び出し口。
///
/// `delete` は対象が既に存在しない場合も成功扱い（または `NotFound`）とする。
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn select_all(&self, entity: &EntityType) -> Result<Vec<RecordPayload>, RemoteError>;
    async fn select_by_id(
        &self,
        entity: &EntityType,
        id: &RecordId,
    ) -> Result<Option<RecordPayload>, RemoteError>;
    async fn insert(
        &self,
        entity: &EntityType,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError>;
    async fn update(
        &self,
        entity: &EntityType,
        id: &RecordId,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError>;
    async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<(), RemoteError>;
}
