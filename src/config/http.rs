use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// A bearer token and the user it authenticates.
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub token: SecretString,
    pub user_id: String,
}

/// Inbound HTTP API configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Static bearer tokens accepted by the caller authenticator.
    pub api_tokens: Vec<ApiToken>,
}

impl HttpConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host = optional_env("HTTP_HOST")?
            .or_else(|| settings.http.host.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_optional_env::<u16>("HTTP_PORT", "a valid port number")?
            .or(settings.http.port)
            .unwrap_or(8080);
        let api_tokens = match optional_env("API_TOKENS")? {
            Some(raw) => parse_api_tokens(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            host,
            port,
            api_tokens,
        })
    }
}

/// Parse `token:user_id` pairs separated by commas.
fn parse_api_tokens(raw: &str) -> Result<Vec<ApiToken>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (token, user_id) = entry
                .split_once(':')
                .map(|(t, u)| (t.trim(), u.trim()))
                .filter(|(t, u)| !t.is_empty() && !u.is_empty())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "API_TOKENS".to_string(),
                    message: "expected comma-separated 'token:user_id' pairs".to_string(),
                })?;
            Ok(ApiToken {
                token: SecretString::from(token.to_string()),
                user_id: user_id.to_string(),
            })
        })
        .collect()
}
