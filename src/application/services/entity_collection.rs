use super::offline_data_service::OfflineDataService;
use crate::domain::entities::offline::{ListQuery, Record};
use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// 型付きで扱うエンティティ。`ENTITY` がローカルテーブルとキューのレーン名になる。
pub trait EntityDescriptor: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY: &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord<T> {
    pub id: RecordId,
    pub data: T,
    pub synced: bool,
    pub local_updated_at: DateTime<Utc>,
}

impl<T: EntityDescriptor> TypedRecord<T> {
    fn from_record(record: Record) -> Result<Self, AppError> {
        let data = serde_json::from_value(record.payload.into_inner()).map_err(|err| {
            AppError::SerializationError(format!(
                "Failed to decode {} record {}: {err}",
                T::ENTITY,
                record.id
            ))
        })?;
        Ok(Self {
            id: record.id,
            data,
            synced: record.synced,
            local_updated_at: record.local_updated_at,
        })
    }
}

/// `OfflineDataService` を 1 エンティティ型に固定したビュー
pub struct EntityCollection<T> {
    service: Arc<OfflineDataService>,
    entity: EntityType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: EntityDescriptor> EntityCollection<T> {
    pub(crate) fn new(service: Arc<OfflineDataService>) -> Result<Self, AppError> {
        let entity = EntityType::new(T::ENTITY.to_string()).map_err(AppError::ValidationError)?;
        Ok(Self {
            service,
            entity,
            _marker: PhantomData,
        })
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    pub async fn create(&self, value: &T) -> Result<TypedRecord<T>, AppError> {
        let record = self.service.create(&self.entity, to_payload(value)?).await?;
        TypedRecord::from_record(record)
    }

    /// `patch` はトップレベルのフィールド単位で上書きする部分オブジェクト
    pub async fn update(
        &self,
        id: &RecordId,
        patch: Value,
    ) -> Result<Option<TypedRecord<T>>, AppError> {
        let patch = RecordPayload::new(patch).map_err(AppError::ValidationError)?;
        self.service
            .update(&self.entity, id, patch)
            .await?
            .map(TypedRecord::from_record)
            .transpose()
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), AppError> {
        self.service.delete(&self.entity, id).await
    }

    pub async fn get_by_id(&self, id: &RecordId) -> Result<Option<TypedRecord<T>>, AppError> {
        self.service
            .get_by_id(&self.entity, id)
            .await?
            .map(TypedRecord::from_record)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<TypedRecord<T>>, AppError> {
        self.list_where(&ListQuery::new()).await
    }

    pub async fn list_where(&self, query: &ListQuery) -> Result<Vec<TypedRecord<T>>, AppError> {
        self.service
            .list(&self.entity, query)
            .await?
            .into_iter()
            .map(TypedRecord::from_record)
            .collect()
    }
}

impl<T> Clone for EntityCollection<T> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            entity: self.entity.clone(),
            _marker: PhantomData,
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<RecordPayload, AppError> {
    let json = serde_json::to_value(value)?;
    RecordPayload::new(json).map_err(AppError::ValidationError)
}
