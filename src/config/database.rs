use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::helpers::{normalize_variant, optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Which storage engine backs the local connection records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    LibSql,
}

impl DatabaseBackend {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "libsql" | "sqlite" | "turso" => Ok(Self::LibSql),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'postgres' or 'libsql', got '{value}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub pool_size: usize,
    pub libsql_path: PathBuf,
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<SecretString>,
}

/// Default libSQL database file: `~/.waprovision/waprovision.db`.
pub fn default_libsql_path() -> PathBuf {
    crate::bootstrap::waprovision_dir().join("waprovision.db")
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = DatabaseBackend::parse(
            &optional_env("DATABASE_BACKEND")?
                .or_else(|| settings.database.backend.clone())
                .unwrap_or_else(|| "libsql".to_string()),
            "DATABASE_BACKEND",
        )?;

        let url = optional_env("DATABASE_URL")?.map(SecretString::from);
        if backend == DatabaseBackend::Postgres && url.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "DATABASE_URL".to_string(),
                hint: "Set DATABASE_URL=postgres://... or DATABASE_BACKEND=libsql".to_string(),
            });
        }

        let pool_size = parse_optional_env::<usize>("DATABASE_POOL_SIZE", "a positive integer")?
            .or(settings.database.pool_size)
            .unwrap_or(10);
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let libsql_path = optional_env("LIBSQL_PATH")?
            .or_else(|| settings.database.libsql_path.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_libsql_path);

        let libsql_url = optional_env("LIBSQL_URL")?.or_else(|| settings.database.libsql_url.clone());
        let libsql_auth_token = optional_env("LIBSQL_AUTH_TOKEN")?.map(SecretString::from);
        if libsql_url.is_some() && libsql_auth_token.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "LIBSQL_AUTH_TOKEN".to_string(),
                hint: "Remote replica sync needs LIBSQL_AUTH_TOKEN".to_string(),
            });
        }

        Ok(Self {
            backend,
            url,
            pool_size,
            libsql_path,
            libsql_url,
            libsql_auth_token,
        })
    }
}
