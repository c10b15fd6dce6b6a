//! Configuration for waprovision.
//!
//! Settings are loaded with priority: env var > config.toml > default.
//! Env vars may come from `./.env` or `~/.waprovision/.env` (loaded via
//! dotenvy early in startup).

mod database;
mod gateway;
pub(crate) mod helpers;
mod http;
mod polling;

use crate::error::ConfigError;
use crate::settings::Settings;

pub use self::database::{DatabaseBackend, DatabaseConfig, default_libsql_path};
pub use self::gateway::{CredentialSource, GatewayPoolConfig};
pub use self::http::{ApiToken, HttpConfig};
pub use self::polling::{PollPolicy, PollingConfig};

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gateway: GatewayPoolConfig,
    pub polling: PollingConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from env vars and the default TOML file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load configuration from env vars plus an optional TOML config file.
    ///
    /// If `toml_path` is `Some`, the file must exist and parse. If `None`,
    /// `~/.waprovision/config.toml` is tried and silently skipped when absent.
    pub fn from_env_with_toml(toml_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_waprovision_env();
        let mut settings = Settings::default();

        Self::apply_toml_overlay(&mut settings, toml_path)?;

        Self::build(&settings)
    }

    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&std::path::Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(std::path::PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                *settings = toml_settings;
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    /// Build config from resolved file settings, letting env vars win.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::resolve(settings)?,
            gateway: GatewayPoolConfig::resolve(settings)?,
            polling: PollingConfig::resolve(settings)?,
            http: HttpConfig::resolve(settings)?,
        })
    }
}
