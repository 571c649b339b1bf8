use crate::application::ports::remote_gateway::RemoteGateway;
use crate::domain::value_objects::{EntityType, RecordId, RecordPayload};
use crate::shared::config::RemoteConfig;
use crate::shared::error::{AppError, RemoteError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;

const REST_PREFIX: &str = "rest/v1";

/// PostgREST 互換の REST API（`/rest/v1/{entity}`）に対するゲートウェイ。
pub struct HttpRemoteGateway {
    base_url: String,
    client: Client,
    timeout_ms: u64,
}

impl HttpRemoteGateway {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let key = HeaderValue::from_str(api_key).map_err(|err| {
                AppError::ConfigurationError(format!("Invalid remote api key: {err}"))
            })?;
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|err| {
                AppError::ConfigurationError(format!("Invalid remote api key: {err}"))
            })?;
            headers.insert("apikey", key);
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                AppError::ConfigurationError(format!("Failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn table_url(&self, entity: &EntityType) -> String {
        format!("{}/{}/{}", self.base_url, REST_PREFIX, entity.as_str())
    }

    fn request(&self, method: Method, entity: &EntityType) -> RequestBuilder {
        self.client.request(method, self.table_url(entity))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|err| map_transport_error(err, self.timeout_ms))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| map_transport_error(err, self.timeout_ms))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        serde_json::from_str(&body)
            .map_err(|err| RemoteError::Server(format!("Malformed response body: {err}")))
    }
}

#[async_trait]
impl RemoteGateway for HttpRemoteGateway {
    async fn select_all(&self, entity: &EntityType) -> Result<Vec<RecordPayload>, RemoteError> {
        let body = self
            .send(self.request(Method::GET, entity).query(&[("select", "*")]))
            .await?;
        rows_from_body(body)
    }

    async fn select_by_id(
        &self,
        entity: &EntityType,
        id: &RecordId,
    ) -> Result<Option<RecordPayload>, RemoteError> {
        let body = self
            .send(
                self.request(Method::GET, entity)
                    .query(&[("select", "*".to_string()), ("id", eq_filter(id))]),
            )
            .await?;
        Ok(rows_from_body(body)?.into_iter().next())
    }

    async fn insert(
        &self,
        entity: &EntityType,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError> {
        let body = self
            .send(
                self.request(Method::POST, entity)
                    .header("Prefer", "return=representation")
                    .json(payload.as_json()),
            )
            .await?;
        first_row_or(body, payload)
    }

    async fn update(
        &self,
        entity: &EntityType,
        id: &RecordId,
        payload: &RecordPayload,
    ) -> Result<RecordPayload, RemoteError> {
        let body = self
            .send(
                self.request(Method::PATCH, entity)
                    .query(&[("id", eq_filter(id))])
                    .header("Prefer", "return=representation")
                    .json(payload.as_json()),
            )
            .await?;

        // 該当行がなければ空配列が返る
        match rows_from_body(body)?.into_iter().next() {
            Some(row) => Ok(row),
            None => Err(RemoteError::NotFound(format!("{entity}/{id}"))),
        }
    }

    async fn delete(&self, entity: &EntityType, id: &RecordId) -> Result<(), RemoteError> {
        self.send(
            self.request(Method::DELETE, entity)
                .query(&[("id", eq_filter(id))]),
        )
        .await?;
        Ok(())
    }
}

fn eq_filter(id: &RecordId) -> String {
    format!("eq.{}", id.as_str())
}

fn rows_from_body(body: Value) -> Result<Vec<RecordPayload>, RemoteError> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Object(_) => vec![body],
        other => {
            return Err(RemoteError::Server(format!(
                "Expected JSON rows, got {other}"
            )));
        }
    };

    rows.into_iter()
        .map(|row| RecordPayload::new(row).map_err(RemoteError::Server))
        .collect()
}

fn first_row_or(body: Value, fallback: &RecordPayload) -> Result<RecordPayload, RemoteError> {
    Ok(rows_from_body(body)?
        .into_iter()
        .next()
        .unwrap_or_else(|| fallback.clone()))
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string()
    });

    match status.as_u16() {
        404 => RemoteError::NotFound(message),
        409 => RemoteError::Conflict(message),
        code @ (400 | 401 | 403 | 422) => RemoteError::Rejected {
            status: code,
            message,
        },
        code @ (408 | 429) => RemoteError::Server(format!("{code}: {message}")),
        code if status.is_server_error() => RemoteError::Server(format!("{code}: {message}")),
        code => RemoteError::Rejected {
            status: code,
            message,
        },
    }
}

fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}

fn map_transport_error(err: reqwest::Error, timeout_ms: u64) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(timeout_ms)
    } else {
        RemoteError::Transport(err.to_string())
    }
}
