use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::entities::offline::QueueEntry;
use crate::domain::value_objects::{MutationOperation, RecordPayload};
use crate::shared::error::RemoteError;
use std::future::Future;
use std::time::Duration;

/// タイムアウトは通信失敗と同じ扱いにする
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout.as_millis() as u64)),
    }
}

/// キューエントリ 1 件をリモートへ再送する。
///
/// create/update は ID 単位の upsert として振る舞うので、曖昧な失敗の後に再送しても重複しない。
/// 成功時は create/update ならリモートの正規化済みペイロードを返す。
pub(crate) async fn replay_entry(
    gateway: &dyn RemoteGateway,
    entry: &QueueEntry,
    timeout: Duration,
) -> Result<Option<RecordPayload>, RemoteError> {
    let entity = &entry.entity;
    let id = &entry.record_id;

    match entry.operation {
        MutationOperation::Create => {
            let payload = require_payload(entry)?;
            match with_timeout(timeout, gateway.insert(entity, payload)).await {
                Err(RemoteError::Conflict(_)) => {
                    with_timeout(timeout, gateway.update(entity, id, payload))
                        .await
                        .map(Some)
                }
                other => other.map(Some),
            }
        }
        MutationOperation::Update => {
            let payload = require_payload(entry)?;
            match with_timeout(timeout, gateway.update(entity, id, payload)).await {
                Err(RemoteError::NotFound(_)) => {
                    with_timeout(timeout, gateway.insert(entity, payload))
                        .await
                        .map(Some)
                }
                other => other.map(Some),
            }
        }
        MutationOperation::Delete => match with_timeout(timeout, gateway.delete(entity, id)).await
        {
            Ok(()) | Err(RemoteError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        },
    }
}

fn require_payload(entry: &QueueEntry) -> Result<&RecordPayload, RemoteError> {
    entry.data.as_ref().ok_or_else(|| RemoteError::Rejected {
        status: 400,
        message: format!(
            "{} entry {} for {}/{} has no payload",
            entry.operation.as_str(),
            entry.id,
            entry.entity,
            entry.record_id
        ),
    })
}
