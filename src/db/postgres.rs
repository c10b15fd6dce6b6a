//! PostgreSQL backend for the Database trait.
//!
//! Connections come from a deadpool pool; schema changes are embedded
//! refinery migrations under `migrations/`.

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::credentials::GatewayCredentials;
use crate::db::{
    ConnectionRecord, ConnectionStatus, ConnectionStore, CredentialStore, Database,
    IdentityMapping, SessionRecord,
};
use crate::error::DatabaseError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// PostgreSQL database backend.
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Create a new PostgreSQL backend from configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config.url.as_ref().ok_or_else(|| {
            DatabaseError::Pool("DATABASE_URL is required for the postgres backend".to_string())
        })?;

        let mut cfg = PoolConfig::new();
        cfg.url = Some(url.expose_secret().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(format!("Failed to create pool: {}", e)))?;

        // Fail fast on an unreachable server rather than on the first request.
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    fn row_to_connection(row: &Row) -> Result<ConnectionRecord, DatabaseError> {
        let raw_status: String = row.get("status");
        let status = ConnectionStatus::parse(&raw_status).ok_or_else(|| {
            DatabaseError::Serialization(format!("unknown connection status '{raw_status}'"))
        })?;
        Ok(ConnectionRecord {
            user_id: row.get("user_id"),
            session_name: row.get("session_name"),
            status,
            phone_number: row.get("phone_number"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_session(row: &Row) -> SessionRecord {
        SessionRecord {
            user_id: row.get("user_id"),
            session_name: row.get("session_name"),
            status: row.get("status"),
            gateway_session_id: row.get("gateway_session_id"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_identity(row: &Row) -> IdentityMapping {
        IdentityMapping {
            identity: row.get("identity"),
            user_id: row.get("user_id"),
            franchise_id: row.get("franchise_id"),
            display_name: row.get("display_name"),
            updated_at: row.get("updated_at"),
        }
    }
}

// ==================== Database (supertrait) ====================

#[async_trait]
impl Database for PgBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.conn().await?;
        embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

// ==================== ConnectionStore ====================

#[async_trait]
impl ConnectionStore for PgBackend {
    async fn upsert_connection(&self, record: &ConnectionRecord) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO whatsapp_connections (user_id, session_name, status, phone_number, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                session_name = EXCLUDED.session_name,
                status = EXCLUDED.status,
                phone_number = COALESCE(EXCLUDED.phone_number, whatsapp_connections.phone_number),
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &record.user_id,
                &record.session_name,
                &record.status.as_str(),
                &record.phone_number,
                &record.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_connection(
        &self,
        user_id: &str,
    ) -> Result<Option<ConnectionRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id, session_name, status, phone_number, updated_at \
                 FROM whatsapp_connections WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        row.as_ref().map(Self::row_to_connection).transpose()
    }

    async fn upsert_session_record(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO whatsapp_sessions (user_id, session_name, status, gateway_session_id, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, session_name) DO UPDATE SET
                status = EXCLUDED.status,
                gateway_session_id = EXCLUDED.gateway_session_id,
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &record.user_id,
                &record.session_name,
                &record.status,
                &record.gateway_session_id,
                &record.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_session_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT user_id, session_name, status, gateway_session_id, updated_at \
                 FROM whatsapp_sessions WHERE user_id = $1 ORDER BY session_name",
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(Self::row_to_session).collect())
    }

    async fn upsert_identity_mapping(
        &self,
        mapping: &IdentityMapping,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO whatsapp_identities (identity, user_id, franchise_id, display_name, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity, user_id) DO UPDATE SET
                franchise_id = COALESCE(EXCLUDED.franchise_id, whatsapp_identities.franchise_id),
                display_name = COALESCE(EXCLUDED.display_name, whatsapp_identities.display_name),
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &mapping.identity,
                &mapping.user_id,
                &mapping.franchise_id,
                &mapping.display_name,
                &mapping.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_identity_mappings(
        &self,
        user_id: &str,
    ) -> Result<Vec<IdentityMapping>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT identity, user_id, franchise_id, display_name, updated_at \
                 FROM whatsapp_identities WHERE user_id = $1 ORDER BY identity",
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(Self::row_to_identity).collect())
    }

    async fn franchise_for_user(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT franchise_id FROM franchise_members WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.map(|row| row.get("franchise_id")))
    }
}

// ==================== CredentialStore ====================

#[async_trait]
impl CredentialStore for PgBackend {
    async fn get_gateway_credentials(
        &self,
        owner_id: &str,
    ) -> Result<Option<GatewayCredentials>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT base_url, api_key FROM gateway_credentials WHERE owner_id = $1",
                &[&owner_id],
            )
            .await?;
        Ok(row.map(|row| GatewayCredentials {
            base_url: row.get("base_url"),
            api_key: SecretString::from(row.get::<_, String>("api_key")),
        }))
    }

    async fn put_gateway_credentials(
        &self,
        owner_id: &str,
        credentials: &GatewayCredentials,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO gateway_credentials (owner_id, base_url, api_key, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (owner_id) DO UPDATE SET
                base_url = EXCLUDED.base_url,
                api_key = EXCLUDED.api_key,
                updated_at = NOW()
            "#,
            &[
                &owner_id,
                &credentials.base_url,
                &credentials.api_key.expose_secret(),
            ],
        )
        .await?;
        Ok(())
    }
}
