use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Where the pooled gateway credentials come from.
///
/// Every tenant shares one gateway account. The account is either given
/// inline (static base URL + API key) or looked up in the credential table
/// under one fixed owner id.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Static {
        base_url: String,
        api_key: SecretString,
    },
    Stored {
        owner: String,
    },
    Unconfigured,
}

#[derive(Debug, Clone)]
pub struct GatewayPoolConfig {
    pub source: CredentialSource,
    pub request_timeout: Duration,
}

impl GatewayPoolConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = optional_env("GATEWAY_BASE_URL")?.or_else(|| settings.gateway.base_url.clone());
        let api_key = optional_env("GATEWAY_API_KEY")?.map(SecretString::from);
        let owner = optional_env("GATEWAY_POOL_OWNER")?.or_else(|| settings.gateway.pool_owner.clone());

        let source = match (base_url, api_key) {
            (Some(base_url), Some(api_key)) => {
                url::Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
                    key: "GATEWAY_BASE_URL".to_string(),
                    message: format!("must be an absolute URL: {e}"),
                })?;
                CredentialSource::Static { base_url, api_key }
            }
            (Some(_), None) => {
                return Err(ConfigError::MissingRequired {
                    key: "GATEWAY_API_KEY".to_string(),
                    hint: "GATEWAY_BASE_URL is set, the pooled API key must be set too".to_string(),
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingRequired {
                    key: "GATEWAY_BASE_URL".to_string(),
                    hint: "GATEWAY_API_KEY is set, the pooled base URL must be set too".to_string(),
                });
            }
            (None, None) => match owner {
                Some(owner) => CredentialSource::Stored { owner },
                None => CredentialSource::Unconfigured,
            },
        };

        let timeout_secs = parse_optional_env::<u64>("GATEWAY_REQUEST_TIMEOUT_SECS", "a positive integer")?
            .unwrap_or(settings.gateway.request_timeout_secs);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            source,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
