use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSyncConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub connectivity: ConnectivityConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// 未指定の場合は `remote.base_url` をプローブする
    #[serde(default)]
    pub probe_url: Option<String>,
    pub probe_timeout_ms: u64,
    pub probe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub reconcile_on_list: bool,
    pub pull_after_reconnect: bool,
    pub coalesce_updates: bool,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_rejections: u32,
}

impl Default for OfflineSyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:54321".to_string(),
                api_key: None,
                request_timeout_ms: 10_000,
            },
            connectivity: ConnectivityConfig {
                probe_url: None,
                probe_timeout_ms: 3_000,
                probe_interval_secs: 15,
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_on_list: true,
            pull_after_reconnect: true,
            coalesce_updates: true,
            backoff_base_ms: 1_000,
            backoff_max_ms: 300_000, // 5 minutes
            max_rejections: 5,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl SyncConfig {
    /// `attempts` 回失敗した後の待機時間（指数バックオフ、上限あり）
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.backoff_max_ms);
        Duration::from_millis(delay)
    }
}

impl OfflineSyncConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("OFFLINE_SYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value as u32;
        }

        if let Ok(v) = std::env::var("OFFLINE_SYNC_REMOTE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("OFFLINE_SYNC_REMOTE_API_KEY") {
            cfg.remote.api_key = if v.trim().is_empty() {
                None
            } else {
                Some(v.trim().to_string())
            };
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_REMOTE_TIMEOUT_MS") {
            cfg.remote.request_timeout_ms = value;
        }

        if let Ok(v) = std::env::var("OFFLINE_SYNC_PROBE_URL") {
            if !v.trim().is_empty() {
                cfg.connectivity.probe_url = Some(v.trim().to_string());
            }
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_PROBE_TIMEOUT_MS") {
            cfg.connectivity.probe_timeout_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_PROBE_INTERVAL_SECS") {
            cfg.connectivity.probe_interval_secs = value;
        }

        if let Ok(v) = std::env::var("OFFLINE_SYNC_RECONCILE_ON_LIST") {
            cfg.sync.reconcile_on_list = parse_bool(&v, cfg.sync.reconcile_on_list);
        }
        if let Ok(v) = std::env::var("OFFLINE_SYNC_PULL_AFTER_RECONNECT") {
            cfg.sync.pull_after_reconnect = parse_bool(&v, cfg.sync.pull_after_reconnect);
        }
        if let Ok(v) = std::env::var("OFFLINE_SYNC_COALESCE_UPDATES") {
            cfg.sync.coalesce_updates = parse_bool(&v, cfg.sync.coalesce_updates);
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_BACKOFF_BASE_MS") {
            cfg.sync.backoff_base_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_BACKOFF_MAX_MS") {
            cfg.sync.backoff_max_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_MAX_REJECTIONS") {
            cfg.sync.max_rejections = value as u32;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.base_url.trim().is_empty() {
            return Err("Remote base_url cannot be empty".to_string());
        }
        if self.remote.request_timeout_ms == 0 {
            return Err("Remote request_timeout_ms must be greater than 0".to_string());
        }
        if self.connectivity.probe_timeout_ms == 0 {
            return Err("Connectivity probe_timeout_ms must be greater than 0".to_string());
        }
        if self.connectivity.probe_interval_secs == 0 {
            return Err("Connectivity probe_interval_secs must be greater than 0".to_string());
        }
        if self.sync.max_rejections == 0 {
            return Err("Sync max_rejections must be greater than 0".to_string());
        }
        if self.sync.backoff_base_ms > self.sync.backoff_max_ms {
            return Err("Sync backoff_base_ms must not exceed backoff_max_ms".to_string());
        }
        Ok(())
    }

    /// プローブ先 URL（明示指定がなければリモートのベース URL）
    pub fn probe_url(&self) -> String {
        self.connectivity
            .probe_url
            .clone()
            .unwrap_or_else(|| self.remote.base_url.clone())
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join("offline-sync");
    format!("sqlite://{}/offline_sync.db?mode=rwc", dir.display())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
