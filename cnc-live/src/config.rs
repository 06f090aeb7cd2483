use crate::link::RECONNECT_DELAY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LiveConfig {
    pub api: ApiConf,
    pub live: LiveConf,
    pub session: SessionConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConf {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LiveConf {
    pub ws_base_url: String,
    pub reconnect_delay_ms: u64,
    pub reject_stale_updates: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SessionConf {
    pub token_file: Option<PathBuf>, // défaut : <config_dir>/cnc-live/token
}

impl Default for ApiConf {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000".into(), timeout_secs: 10 }
    }
}

impl Default for LiveConf {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000".into(),
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
            reject_stale_updates: false,
        }
    }
}

impl LiveConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Délai fixe entre deux tentatives ; 0 (YAML) retombe sur 3000 ms
    pub fn reconnect_delay(&self) -> Duration {
        if self.live.reconnect_delay_ms == 0 {
            warn!("[config] reconnect_delay_ms = 0 refusé, délai par défaut {:?}", RECONNECT_DELAY);
            return RECONNECT_DELAY;
        }
        Duration::from_millis(self.live.reconnect_delay_ms)
    }

    pub fn token_path(&self) -> PathBuf {
        self.session.token_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cnc-live")
                .join("token")
        })
    }

    /// Surcharges `CNC_API_URL`, `CNC_WS_URL`, `CNC_RECONNECT_DELAY_MS`
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("CNC_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("CNC_WS_URL").filter(|v| !v.trim().is_empty()) {
            self.live.ws_base_url = url;
        }
        if let Some(raw) = lookup("CNC_RECONNECT_DELAY_MS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => warn!("[config] CNC_RECONNECT_DELAY_MS = 0 ignoré, reconnexion sans pause interdite"),
                Ok(ms) => self.live.reconnect_delay_ms = ms,
                Err(e) => warn!("[config] CNC_RECONNECT_DELAY_MS ignoré ({raw}): {e}"),
            }
        }
        self
    }
}

/// YAML -> config ; vide ou invalide = défauts
pub fn parse_config(txt: &str) -> LiveConfig {
    if txt.trim().is_empty() {
        return LiveConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[config] config invalide: {e}");
        LiveConfig::default()
    })
}

pub async fn load_config() -> LiveConfig {
    let path = std::env::var("CNC_LIVE_CONFIG").unwrap_or_else(|_| "cnc-live.yaml".into());
    load_config_from(Path::new(&path)).await.apply_env(|key| std::env::var(key).ok())
}

pub async fn load_config_from(path: &Path) -> LiveConfig {
    if path.exists() {
        match fs::read_to_string(path).await {
            Ok(txt) => parse_config(&txt),
            Err(e) => {
                warn!("[config] lecture {} impossible: {e}", path.display());
                LiveConfig::default()
            }
        }
    } else {
        warn!("[config] pas de {}, usage config par défaut", path.display());
        LiveConfig::default()
    }
}
