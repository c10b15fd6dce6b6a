//! File-backed settings.
//!
//! Stores operator preferences in `~/.waprovision/config.toml`.
//! Settings are resolved with env var > config.toml > default priority; this
//! module only owns the file layer and its defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Operator settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatabaseSettings {
    /// Database backend: "postgres" or "libsql".
    #[serde(default)]
    pub backend: Option<String>,

    /// Database pool size (postgres only).
    #[serde(default)]
    pub pool_size: Option<usize>,

    /// Path to local libSQL database file.
    #[serde(default)]
    pub libsql_path: Option<String>,

    /// Turso cloud URL for remote replica sync.
    #[serde(default)]
    pub libsql_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySettings {
    /// Account that owns the pooled gateway credentials.
    #[serde(default)]
    pub pool_owner: Option<String>,

    /// Static gateway base URL, bypassing the credential table.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            pool_owner: None,
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub readiness_interval_ms: u64,

    #[serde(default = "default_readiness_max_attempts")]
    pub readiness_max_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub qr_interval_ms: u64,

    #[serde(default = "default_qr_max_attempts")]
    pub qr_max_attempts: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            readiness_interval_ms: default_poll_interval_ms(),
            readiness_max_attempts: default_readiness_max_attempts(),
            qr_interval_ms: default_poll_interval_ms(),
            qr_max_attempts: default_qr_max_attempts(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_readiness_max_attempts() -> u32 {
    30
}

// QR generation lags session start, so its budget is twice the readiness one.
fn default_qr_max_attempts() -> u32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HttpSettings {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,
}

impl Settings {
    /// Default TOML config file path (~/.waprovision/config.toml).
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::waprovision_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }
}
