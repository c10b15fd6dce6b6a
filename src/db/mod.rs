//! Local persistence for connection state.
//!
//! Three independent records are reconciled against the gateway:
//! the per-user connection row, the per-(user, session) snapshot and the
//! captured device identity. All writes are upserts so a retried
//! orchestration converges on the same rows.

#[cfg(feature = "libsql")]
pub mod libsql;
#[cfg(feature = "libsql")]
pub mod libsql_migrations;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::credentials::GatewayCredentials;
use crate::error::DatabaseError;

/// Local view of a user's messaging connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            _ => None,
        }
    }
}

/// One current row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub user_id: String,
    pub session_name: String,
    pub status: ConnectionStatus,
    pub phone_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of the gateway session, keyed by (user_id, session_name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub session_name: String,
    /// Gateway status string as last observed (e.g. `SCAN_QR_CODE`).
    pub status: String,
    pub gateway_session_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Device identity reported by a WORKING session, keyed by (identity, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMapping {
    pub identity: String,
    pub user_id: String,
    pub franchise_id: Option<String>,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Connection, session and identity records.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn upsert_connection(&self, record: &ConnectionRecord) -> Result<(), DatabaseError>;

    async fn get_connection(&self, user_id: &str)
    -> Result<Option<ConnectionRecord>, DatabaseError>;

    async fn upsert_session_record(&self, record: &SessionRecord) -> Result<(), DatabaseError>;

    async fn list_session_records(&self, user_id: &str)
    -> Result<Vec<SessionRecord>, DatabaseError>;

    async fn upsert_identity_mapping(&self, mapping: &IdentityMapping)
    -> Result<(), DatabaseError>;

    async fn list_identity_mappings(
        &self,
        user_id: &str,
    ) -> Result<Vec<IdentityMapping>, DatabaseError>;

    /// Franchise the user belongs to, if any.
    async fn franchise_for_user(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;
}

/// Pooled gateway credentials, keyed by owning account.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_gateway_credentials(
        &self,
        owner_id: &str,
    ) -> Result<Option<GatewayCredentials>, DatabaseError>;

    async fn put_gateway_credentials(
        &self,
        owner_id: &str,
        credentials: &GatewayCredentials,
    ) -> Result<(), DatabaseError>;
}

/// Unified storage backend.
#[async_trait]
pub trait Database: ConnectionStore + CredentialStore + Send + Sync {
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

/// Open the configured backend and apply its schema.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    let db = open_from_config(config).await?;
    db.run_migrations().await?;
    tracing::info!(backend = ?config.backend, "Database ready");
    Ok(db)
}

/// Open the configured backend without touching its schema.
pub async fn open_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    let db: Arc<dyn Database> = match config.backend {
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => Arc::new(postgres::PgBackend::new(config).await?),
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            use secrecy::ExposeSecret;

            let backend = match (&config.libsql_url, &config.libsql_auth_token) {
                (Some(url), Some(token)) => {
                    libsql::LibSqlBackend::new_remote_replica(
                        &config.libsql_path,
                        url,
                        token.expose_secret(),
                    )
                    .await?
                }
                _ => libsql::LibSqlBackend::new_local(&config.libsql_path).await?,
            };
            Arc::new(backend)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(DatabaseError::Pool(format!(
                "database backend {other:?} is not compiled into this build"
            )));
        }
    };
    Ok(db)
}
