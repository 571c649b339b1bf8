use super::RecordId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// ドメインエンティティのフィールド一式（JSON オブジェクト）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPayload(Value);

impl RecordPayload {
    pub fn new(value: Value) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("Invalid JSON payload: {e}"))?;
        Self::new(value)
    }

    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// ペイロード内の `id`（文字列または数値）
    pub fn record_id(&self) -> Option<RecordId> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) => RecordId::new(s.clone()).ok(),
            Value::Number(n) => RecordId::new(n.to_string()).ok(),
            _ => None,
        }
    }

    /// `id` / `created_at` / `updated_at` が欠けていれば補う。
    pub fn ensure_identity(mut self, id: &RecordId, now: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(now);
        let map = self.object_mut();
        map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        if !has_value(map, CREATED_AT_FIELD) {
            map.insert(CREATED_AT_FIELD.to_string(), Value::String(stamp.clone()));
        }
        if !has_value(map, UPDATED_AT_FIELD) {
            map.insert(UPDATED_AT_FIELD.to_string(), Value::String(stamp));
        }
        self
    }

    /// トップレベルのキー単位で patch を上書きする。`id` は書き換えない。
    pub fn merge_patch(&self, patch: &RecordPayload) -> RecordPayload {
        let mut merged = self.clone();
        let map = merged.object_mut();
        if let Value::Object(patch_map) = &patch.0 {
            for (key, value) in patch_map {
                if key == ID_FIELD {
                    continue;
                }
                map.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    pub fn touch(mut self, now: DateTime<Utc>) -> Self {
        self.object_mut().insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(now)),
        );
        self
    }

    fn object_mut(&mut self) -> &mut Map<String, Value> {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        match &mut self.0 {
            Value::Object(map) => map,
            _ => unreachable!("payload is always an object"),
        }
    }

    fn validate(value: &Value) -> Result<(), String> {
        if !value.is_object() {
            return Err("Record payload must be a JSON object".to_string());
        }
        Ok(())
    }
}

impl From<RecordPayload> for Value {
    fn from(payload: RecordPayload) -> Self {
        payload.0
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn has_value(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).map(|v| !v.is_null()).unwrap_or(false)
}
