use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    SelectAll,
    SelectById,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub operation: RemoteOperation,
    pub entity: EntityType,
    pub record_id: Option<RecordId>,
    pub succeeded: bool,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<EntityType, BTreeMap<RecordId, RecordPayload>>,
    reachable: bool,
    queued_failures: VecDeque<RemoteError>,
    rejected_entities: HashMap<EntityType, String>,
    latency: Option<Duration>,
    calls: Vec<RemoteCall>,
}

/// プロセス内で完結するリモートの代替。オフライン動作の確認や障害注入に使う。
///
/// `select_all` は ID 順に返す。
pub struct InMemoryRemoteGateway {
    state: Mutex<MemoryState>,
}

impl InMemoryRemoteGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reachable: true,
                ..MemoryState::default()
            }),
        }
    }

    pub fn seed(&self, entity: &EntityType, rows: Vec<RecordPayload>) {
        let mut state = self.lock();
        let table = state.tables.entry(entity.clone()).or_default();
        for row in rows {
            if let Some(id) = row.record_id() {
                table.insert(id, row);
            }
        }
    }

    pub fn rows(&self, entity: &EntityType) -> Vec<RecordPayload> {
        self.lock()
            .tables
            .get(entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, entity: &EntityType, id: &RecordId) -> Option<RecordPayload> {
        self.lock()
            .tables
            .get(entity)
            .and_then(|table| table.get(id).cloned())
    }

    /// `false` の間はすべての呼び出しが `Transport` エラーになる
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn is_reachable(&self) -> bool {
        self.lock().reachable
    }

    /// 次の `count` 回の呼び出しを `error` で失敗させる
    pub fn fail_next(&self, count: usize, error: RemoteError) {
        let mut state = self.lock();
        for _ in 0..count {
            state.queued_failures.push_back(error.clone());
        }
    }

    /// 指定エンティティへの書き込みを 422 で拒否する
    pub fn reject_writes(&self, entity: &EntityType, message: impl Into<String>) {
        self.lock()
            .rejected_entities
            .insert(entity.clone(), message.into());
    }

    pub fn accept_writes(&self, entity: &EntityType) {
        self.lock().rejected_entities.remove(entity);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(
                    call.operation,
                    RemoteOperation::SelectAll | RemoteOperation::SelectById
                )
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // テスト補助のため poison は無視して中身を使う
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn execute<T>(
        &self,
        operation: RemoteOperation,
        entity: &EntityType,
        record_id: Option<&RecordId>,
        apply: impl FnOnce(&mut MemoryState) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut state = self.lock();
        let result = if !state.reachable {
            Err(RemoteError::Transport("connection refused".to_string()))
        } else if let Some(err) = state.queued_failures.pop_front() {
            Err(err)
        } else {
            apply(&mut *state)
        };

        state.calls.push(RemoteCall {
            operation,
            entity: entity.clone(),
            record_id: record_id.cloned(),
            succeeded: result.is_ok(),
        });
        result
    }
}

impl Default for InMemoryRemoteGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn check_writable(state: &MemoryState, entity: &EntityType) -> Result<(), RemoteError> {
    match state.rejected_entities.get(entity) {
        Some(message) => Err(RemoteError::Rejected {
            status: 422,
            message: message.clone(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl RemoteGateway for InMemoryRemoteGateway {
    async fn select_all(&self, entity: &EntityType) -> Result<Vec<RecordPayload>, RemoteError> {
        self.simulate_latency().await;
        self.execute(RemoteOperation::SelectAll, entity, None, |state| {
            Ok(state
                .tables
                .get(entity)
                .map(|table| table.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    async fn select_by_id(
        &self,
        entity: &EntityType,
        id: &RecordId,
    ) -> Result<Option<RecordPayload>, RemoteError> {
        self.simulate_latency().await;
        self.execute(RemoteOperation::SelectById, entity, Some(id), |state| {
            Ok(state
                .tables
                .get(entity)
                .and_then(|table| table.get(id).cloned()))
        })
    }

    async fn insert(
        &self,
        entity: &EntityType,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError> {
        self.simulate_latency().await;
        let id = payload.record_id().ok_or_else(|| RemoteError::Rejected {
            status: 400,
            message: "payload is missing an id".to_string(),
        })?;

        self.execute(RemoteOperation::Insert, entity, Some(&id), |state| {
            check_writable(state, entity)?;
            let table = state.tables.entry(entity.clone()).or_default();
            if table.contains_key(&id) {
                return Err(RemoteError::Conflict(format!(
                    "duplicate key value violates unique constraint ({entity}/{id})"
                )));
            }
            table.insert(id.clone(), payload.clone());
            Ok(payload.clone())
        })
    }

    async fn update(
        &self,
        entity: &EntityType,
        id: &RecordId,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError> {
        self.simulate_latency().await;
        self.execute(RemoteOperation::Update, entity, Some(id), |state| {
            check_writable(state, entity)?;
            let row = state
                .tables
                .get_mut(entity)
                .and_then(|table| table.get_mut(id))
                .ok_or_else(|| RemoteError::NotFound(format!("{entity}/{id}")))?;
            *row = row.merge_patch(payload);
            Ok(row.clone())
        })
    }

    async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        self.execute(RemoteOperation::Delete, entity, Some(id), |state| {
            if let Some(table) = state.tables.get_mut(entity) {
                table.remove(id);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agendamentos() -> EntityType {
        EntityType::new("agendamentos".into()).unwrap()
    }

    fn payload(value: serde_json::Value) -> RecordPayload {
        RecordPayload::new(value).unwrap()
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_id_and_update_merges() {
        let gateway = InMemoryRemoteGateway::new();
        let entity = agendamentos();
        gateway
            .insert(&entity, &payload(json!({"id": "a-1", "hora": "10:00"})))
            .await
            .unwrap();

        let dup = gateway
            .insert(&entity, &payload(json!({"id": "a-1", "hora": "11:00"})))
            .await;
        assert!(matches!(dup, Err(RemoteError::Conflict(_))));

        let id = RecordId::new("a-1".into()).unwrap();
        let merged = gateway
            .update(&entity, &id, &payload(json!({"status": "confirmado"})))
            .await
            .unwrap();
        assert_eq!(merged.get("hora"), Some(&json!("10:00")));
        assert_eq!(merged.get("status"), Some(&json!("confirmado")));

        let missing = RecordId::new("a-2".into()).unwrap();
        assert!(matches!(
            gateway.update(&entity, &missing, &payload(json!({}))).await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(gateway.delete(&entity, &missing).await.is_ok());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let gateway = InMemoryRemoteGateway::new();
        let entity = agendamentos();
        gateway.fail_next(1, RemoteError::Timeout(100));

        assert_eq!(
            gateway.select_all(&entity).await,
            Err(RemoteError::Timeout(100))
        );
        assert!(gateway.select_all(&entity).await.is_ok());

        gateway.set_reachable(false);
        assert!(matches!(
            gateway.select_all(&entity).await,
            Err(RemoteError::Transport(_))
        ));

        gateway.set_reachable(true);
        gateway.reject_writes(&entity, "hora invalida");
        let err = gateway
            .insert(&entity, &payload(json!({"id": "a-1"})))
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        let calls = gateway.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.iter().filter(|c| c.succeeded).count(), 1);
        assert!(gateway.rows(&entity).is_empty());
    }
}
