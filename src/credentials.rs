//! Pooled gateway credentials.
//!
//! All tenants share one gateway account. The orchestrator asks a
//! [`CredentialLookup`] for it on every request, so rotating the stored row
//! takes effect without a restart.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::{CredentialSource, GatewayPoolConfig};
use crate::db::CredentialStore;
use crate::error::ConfigError;

/// Base URL and API key of the shared gateway account.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub base_url: String,
    pub api_key: SecretString,
}

#[async_trait]
pub trait CredentialLookup: Send + Sync {
    async fn pooled_credentials(&self) -> Result<GatewayCredentials, ConfigError>;
}

/// Credentials fixed at startup from config.
pub struct StaticCredentialLookup {
    credentials: GatewayCredentials,
}

impl StaticCredentialLookup {
    pub fn new(credentials: GatewayCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialLookup for StaticCredentialLookup {
    async fn pooled_credentials(&self) -> Result<GatewayCredentials, ConfigError> {
        Ok(self.credentials.clone())
    }
}

/// Credentials read from the credential table under a fixed owner id.
pub struct StoredCredentialLookup {
    store: Arc<dyn CredentialStore>,
    owner: String,
}

impl StoredCredentialLookup {
    pub fn new(store: Arc<dyn CredentialStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl CredentialLookup for StoredCredentialLookup {
    async fn pooled_credentials(&self) -> Result<GatewayCredentials, ConfigError> {
        let unavailable = |reason: String| ConfigError::CredentialsUnavailable {
            owner: self.owner.clone(),
            reason,
        };

        let credentials = self
            .store
            .get_gateway_credentials(&self.owner)
            .await
            .map_err(|e| unavailable(e.to_string()))?
            .ok_or_else(|| unavailable("no credential row".to_string()))?;

        if credentials.base_url.trim().is_empty() {
            return Err(unavailable("stored base URL is empty".to_string()));
        }
        Ok(credentials)
    }
}

/// Used when neither static credentials nor a pool owner are configured.
pub struct UnconfiguredCredentialLookup;

#[async_trait]
impl CredentialLookup for UnconfiguredCredentialLookup {
    async fn pooled_credentials(&self) -> Result<GatewayCredentials, ConfigError> {
        Err(ConfigError::MissingRequired {
            key: "GATEWAY_POOL_OWNER".to_string(),
            hint: "Set GATEWAY_BASE_URL and GATEWAY_API_KEY, or GATEWAY_POOL_OWNER".to_string(),
        })
    }
}

/// Build the lookup matching the configured credential source.
pub fn lookup_from_config(
    config: &GatewayPoolConfig,
    store: Arc<dyn CredentialStore>,
) -> Arc<dyn CredentialLookup> {
    match &config.source {
        CredentialSource::Static { base_url, api_key } => {
            Arc::new(StaticCredentialLookup::new(GatewayCredentials {
                base_url: base_url.clone(),
                api_key: api_key.clone(),
            }))
        }
        CredentialSource::Stored { owner } => {
            Arc::new(StoredCredentialLookup::new(store, owner.clone()))
        }
        CredentialSource::Unconfigured => {
            tracing::warn!("No pooled gateway credentials configured; connect requests will fail");
            Arc::new(UnconfiguredCredentialLookup)
        }
    }
}
